use crate::models::{status::truncate_chars, InferenceResult};

pub const SYSTEM_PROMPT: &str = "\
You are an agent playing a video game. You watch short gameplay clips and decide what to do next.

Respond with:
- reasoning: one short sentence on what you see and what you are doing about it
- actions: the inputs to perform, in order (a short sequence usually plays more smoothly than a single input)

Only trust what the most recent frames of the video show. Do not invent game state.

Action types:
- key_press: press and release `key` (optional `duration` in seconds to hold it)
- key_down: hold `key` down
- key_up: release a held `key`
- mouse_move: move the pointer to `bbox`
- mouse_click: click `button` (left/right/middle) at `bbox`
- mouse_down: press `button`
- mouse_up: release `button`
- wait: pause for `duration` seconds

Positions: every mouse action that targets something gives a `bbox` of [y_min, x_min, y_max, x_max] \
around the target, on a 0-1000 scale over the whole video frame (0 is the top/left edge, 1000 the \
bottom/right edge). Never set `x` or `y`; they are derived from `bbox`.

Key names: a-z, 0-9, f1-f12, space, shift, ctrl, alt, tab, escape, enter, backspace, up, down, left, right.
";

const BASE_INSTRUCTION: &str = "Analyze this gameplay video and decide what actions to take.";
const HISTORY_REASONING_CHARS: usize = 150;

/// Text part of the request: the fixed instruction, the previous turn (if
/// any) and the user's game notes.
pub fn user_prompt(history: Option<&InferenceResult>, game_context: &str) -> String {
    let mut prompt = BASE_INSTRUCTION.to_string();

    if let Some(previous) = history {
        let actions = if previous.actions.is_empty() {
            "none".to_string()
        } else {
            previous
                .actions
                .iter()
                .map(|action| action.describe())
                .collect::<Vec<_>>()
                .join(", ")
        };
        prompt.push_str(&format!(
            "\n\nPrevious action — Reasoning: {} | Actions: {}",
            truncate_chars(&previous.reasoning, HISTORY_REASONING_CHARS),
            actions
        ));
        prompt.push_str(
            "\nThe previous action was executed before and during this video's recording. \
             The end of the video shows its result and the most recent game state.",
        );
    }

    let context = game_context.trim();
    if !context.is_empty() {
        prompt.push_str("\n\nGame context:\n");
        prompt.push_str(context);
    }
    prompt
}

/// Rough input-token cost of a clip: per-frame cost by resolution plus the
/// audio track rate.
pub fn estimate_video_tokens(duration_secs: f64, fps: u32, media_resolution: &str) -> u64 {
    let frames = (duration_secs * fps as f64).ceil() as u64;
    let per_frame = if media_resolution == "low" { 66 } else { 258 };
    let audio = (32.0 * duration_secs) as u64;
    frames * per_frame + audio
}
