//! Prompt construction for expert calls
//!
//! Every expert gets the same event context. The seed picks a persona and a
//! phrasing so panel members are not deterministically identical.

use crate::domain::{EventContext, Side};

const PERSONAS: &[&str] = &[
    "You are a veteran sports handicapper who prices games for a living.",
    "You are a quantitative sports analyst who relies on efficiency ratings and schedule data.",
    "You are a former scout who weighs matchups, injuries and coaching tendencies.",
    "You are a skeptical betting-market analyst who looks for where the public is wrong.",
    "You are a statistician who reasons from base rates before adjusting for context.",
];

const FOCUS: &[&str] = &[
    "Start from the market price, then adjust for anything the market may be missing.",
    "Ignore the market price at first and build your own number, then compare.",
    "Focus on rest, travel and lineup availability before anything else.",
    "Weigh recent form against season-long quality and explain the balance you strike.",
];

/// Default system prompt for expert calls
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are one member of an independent panel of forecasters.

Give your own probability estimate for the requested outcome. Do not hedge
with ranges; commit to a single number between 0% and 100%.

Always name the side your number refers to."#;

/// Build the prompt for one expert. Same seed, same prompt.
pub fn build_expert_prompt(event: &EventContext, target: Side, seed: u64) -> String {
    let persona = PERSONAS[(seed % PERSONAS.len() as u64) as usize];
    let focus = FOCUS[((seed / PERSONAS.len() as u64) % FOCUS.len() as u64) as usize];
    let target_name = event.name(target);

    let mut context = format!(
        "## Event\n{} (side A) vs {} (side B)\n",
        event.name(Side::A),
        event.name(Side::B)
    );
    if let Some(league) = event.league() {
        context.push_str(&format!("League: {}\n", league));
    }
    if let Some(venue) = event.venue() {
        context.push_str(&format!("Venue: {}\n", venue));
    }
    if let Some(start) = event.start_time() {
        context.push_str(&format!("Start: {}\n", start.format("%Y-%m-%d %H:%M UTC")));
    }
    if let Some(notes) = event.notes() {
        context.push_str(&format!("Notes: {}\n", notes));
    }
    context.push_str(&format!(
        "\n## Market odds\n{}: {}\n{}: {}\n",
        event.name(Side::A),
        event.odds(Side::A),
        event.name(Side::B),
        event.odds(Side::B)
    ));

    format!(
        r#"{persona}

{context}
## Your Task
Estimate the probability that {target} wins. {focus}

Respond with a JSON block in this EXACT format:
```json
{{
  "side": "{target}",
  "win_probability": 0.XX,
  "confidence": 0.XX,
  "reasoning": "2-3 sentences citing the factors that moved your number"
}}
```

Then repeat your number on its own line as:
{target} win probability: XX%

(panel seat {seed:016x})"#,
        persona = persona,
        context = context,
        target = target_name,
        focus = focus,
        seed = seed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Odds;

    fn event() -> EventContext {
        EventContext::new("Lakers", "Celtics", Odds::American(-150), Odds::American(130))
            .unwrap()
            .with_venue("Crypto.com Arena")
            .with_notes("Celtics on a back-to-back")
    }

    #[test]
    fn test_prompt_names_target_side() {
        let prompt = build_expert_prompt(&event(), Side::B, 3);
        assert!(prompt.contains("probability that Celtics wins"));
        assert!(prompt.contains("Celtics win probability: XX%"));
        assert!(prompt.contains("Lakers: -150"));
        assert!(prompt.contains("Celtics: +130"));
        assert!(prompt.contains("Venue: Crypto.com Arena"));
    }

    #[test]
    fn test_prompt_varies_with_seed() {
        let e = event();
        assert_eq!(build_expert_prompt(&e, Side::A, 7), build_expert_prompt(&e, Side::A, 7));
        assert_ne!(build_expert_prompt(&e, Side::A, 1), build_expert_prompt(&e, Side::A, 2));
    }
}
