use crate::config::GenerationDefaults;
use crate::types::chat::{
    AssembledChat, ConversationTurn, GenerationSettings, Part, ResolvedSettings, Role,
    ValidatedChat,
};

/// Build the ordered turns sent upstream.
///
/// A separate `prompt` always becomes a new trailing user turn. Media join
/// the newest user turn after its text: the new turn when a prompt was
/// given, otherwise the caller's trailing user turn (the validator has
/// already guaranteed it exists). Earlier turns are never touched.
pub fn assemble(
    chat: ValidatedChat,
    defaults: &GenerationDefaults,
    search_grounding: bool,
) -> AssembledChat {
    let ValidatedChat {
        mut history,
        prompt,
        media,
        settings,
    } = chat;

    let media_parts = media.into_iter().map(Part::Media);

    match prompt {
        Some(prompt) => {
            let mut parts = Vec::new();
            if !prompt.trim().is_empty() {
                parts.push(Part::Text(prompt));
            }
            parts.extend(media_parts);
            history.push(ConversationTurn {
                role: Role::User,
                parts,
            });
        }
        None => {
            if let Some(last) = history.last_mut().filter(|t| t.role == Role::User) {
                last.parts.extend(media_parts);
            }
        }
    }

    AssembledChat {
        contents: history,
        settings: resolve_settings(settings, defaults, search_grounding),
    }
}

pub fn resolve_settings(
    settings: GenerationSettings,
    defaults: &GenerationDefaults,
    search_grounding: bool,
) -> ResolvedSettings {
    ResolvedSettings {
        temperature: settings.temperature.unwrap_or(defaults.temperature),
        max_output_tokens: settings
            .max_output_tokens
            .unwrap_or(defaults.max_output_tokens),
        system_instruction: settings
            .system_instruction
            .or_else(|| defaults.system_instruction.clone()),
        safety_thresholds: settings
            .safety_thresholds
            .unwrap_or_else(|| defaults.safety_thresholds.clone()),
        search_grounding,
    }
}
