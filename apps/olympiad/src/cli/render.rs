//! Plain-text rendering of stage views.

use olympiad_core::{BracketStageView, GenerationSummary, GroupsStageView};

/// Standings as one block per group, pairings in seed order.
pub fn render_groups(view: &GroupsStageView) -> String {
    let mut out = String::new();
    for group in &view.groups {
        out.push_str(&format!("Group {}\n", group.name));
        for (i, a) in group.participants.iter().enumerate() {
            for b in &group.participants[i + 1..] {
                let score = group
                    .scores
                    .get(a)
                    .and_then(|row| row.get(b))
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| "-".to_string());
                out.push_str(&format!("  {} vs {}: {}\n", a, b, score));
            }
        }
        out.push('\n');
    }
    out.push_str(&format!("Participants: {}\n", view.total_participants));
    out
}

/// Rounds from first to final.
pub fn render_bracket(view: &BracketStageView) -> String {
    if view.rounds.is_empty() {
        return "No matches\n".to_string();
    }
    let mut out = String::new();
    let last = view.rounds.len() - 1;
    for (index, round) in view.rounds.iter().enumerate() {
        if index == last {
            out.push_str("Final\n");
        } else {
            out.push_str(&format!("Round {}\n", index + 1));
        }
        for m in &round.matches {
            out.push_str(&format!("  [{}] {} vs {}  ({})\n", m.id, m.p1, m.p2, m.score));
        }
    }
    out
}

pub fn render_summary(summary: &GenerationSummary) -> String {
    format!(
        "Stage {} ({}): {} participants, {} groups, {} matches, {} byes",
        summary.stage,
        summary.kind,
        summary.participants,
        summary.groups,
        summary.matches,
        summary.byes
    )
}
