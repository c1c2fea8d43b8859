//! Session banner shown when a chat starts or switches session.

use console::style;

use parley_types::session::StoredSession;

/// Banner naming the session, its backend, and how much history it has.
pub fn session_banner(session: &StoredSession, base_url: &str) -> String {
    let short_id = session.id.get(..8).unwrap_or(&session.id);
    let mut out = String::new();

    out.push_str(&format!("\n  {}\n\n", style(&session.title).cyan().bold()));
    out.push_str(&format!("  {}  {}\n", style("Backend:").bold(), style(base_url).dim()));
    out.push_str(&format!("  {}  {}\n", style("Session:").bold(), style(short_id).dim()));
    if !session.history.is_empty() {
        out.push_str(&format!(
            "  {}  {} (/history to view)\n",
            style("History:").bold(),
            style(format!("{} turns", session.history.len())).dim()
        ));
    }
    out.push_str(&format!(
        "\n  {}\n  {}\n\n",
        style("Type /help for commands, Ctrl+D to exit").dim(),
        style("---").dim()
    ));
    out
}
