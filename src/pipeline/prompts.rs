//! Fixed instruction templates and prompt assembly for the three stages.

use chrono::Utc;

use crate::pipeline::envelope::Envelope;

/// Stage 1 — initial relevance gate.
pub const FILTER_INSTRUCTIONS: &str = "\
You are the first filter of a news channel. Decide whether the message \
above is a genuine, publishable news item: a concrete event or fact, not \
an advertisement, not spam, not a bare opinion, and not an incoherent \
fragment. Answer with a field \"decision\" set to \"Yes\" or \"No\" and a \
short field \"explanation\" giving the reason.";

/// Stage 2 — journalistic-context completeness scoring.
pub const CONTEXT_INSTRUCTIONS: &str = "\
Rate how completely the message above answers the basic journalistic \
questions. Give an integer from 0 to 10 for each of: \"subject\" (who \
acts), \"object\" (who or what is affected), \"which\" (identifying \
detail), \"action\" (what happened), \"time_place\" (when and where), \
\"how\" (in what manner), \"reason\" (why it happened), \"consequences\" \
(what follows from it). Add a short \"explanation\" of the weakest \
points.";

/// Stage 3 — one instruction per characteristic.
pub const EMOTION_INSTRUCTIONS: &str = "\
Rate the emotional vividness of the news text above on a 0-10 integer \
\"score\": how strongly it stirs feeling in an average reader. Explain \
the rating in a short \"explanation\" field.";

pub const IMAGERY_INSTRUCTIONS: &str = "\
Rate the imagery of the news text above on a 0-10 integer \"score\": how \
concrete and picturable the scene it paints is. Explain the rating in a \
short \"explanation\" field.";

pub const HUMOR_INSTRUCTIONS: &str = "\
Rate the humor potential of the news text above on a 0-10 integer \
\"score\": how much comic material it offers, intended or not. Explain \
the rating in a short \"explanation\" field.";

pub const SURPRISE_INSTRUCTIONS: &str = "\
Rate the surprise factor of the news text above on a 0-10 integer \
\"score\": how much it departs from what a reader would expect. Explain \
the rating in a short \"explanation\" field.";

pub const DRAMA_INSTRUCTIONS: &str = "\
Rate the drama of the news text above on a 0-10 integer \"score\": the \
stakes, conflict and tension in the story. Explain the rating in a \
short \"explanation\" field.";

/// Assemble the stage 1 prompt: body, link, fixed template.
pub fn initial_gate_prompt(envelope: &Envelope) -> String {
    format!(
        "Message: {}\nLink: {}\n\n{FILTER_INSTRUCTIONS}",
        envelope.body,
        envelope.link_or_sentinel()
    )
}

/// Assemble the stage 2 prompt: current date, body, fixed template.
pub fn context_gate_prompt(body: &str) -> String {
    let current_date = Utc::now().format("%Y-%m-%d");
    format!("Current date: {current_date}\nMessage: {body}\n\n{CONTEXT_INSTRUCTIONS}")
}

/// Assemble a stage 3 prompt for one characteristic instruction.
pub fn characteristic_prompt(body: &str, instructions: &str) -> String {
    format!("News text: {body}\n\n{instructions}")
}

/// Assemble the commentary-recommendation prompt from the explanations
/// of the peak-scoring characteristics.
pub fn commentary_prompt(body: &str, peak_lines: &str) -> String {
    format!(
        "News text: {body}\n\nThe following aspects of this news scored \
         highest in our evaluation:\n{peak_lines}\n\nSuggest two or three \
         short angles for an editorial commentary that builds on exactly \
         these aspects. Paraphrase — do not quote the news text or the \
         explanations verbatim. Answer with the recommendations only."
    )
}
