//! Plain-text rendering of revisions for `history`, `show` and `--sql` output

use scribe::migration::{Direction, Migration, RevisionChain};

/// `base` for the empty revision
pub fn format_revision(revision: Option<&str>) -> &str {
    revision.unwrap_or("base")
}

/// One line per revision, newest first, marking heads and the Current Revision
pub fn history_lines(chain: &RevisionChain, current: Option<&str>) -> Vec<String> {
    let heads = chain.heads();
    let migrations: Vec<&dyn Migration> = chain.iter().collect();

    migrations
        .into_iter()
        .rev()
        .map(|migration| {
            let mut line = format!(
                "{} -> {}",
                migration.down_revision().unwrap_or("<base>"),
                migration.revision()
            );
            if !migration.branch_labels().is_empty() {
                line.push_str(&format!(" ({})", migration.branch_labels().join(", ")));
            }
            if heads.contains(&migration.revision()) {
                line.push_str(" (head)");
            }
            if current == Some(migration.revision()) {
                line.push_str(" (current)");
            }
            line.push_str(&format!(", {}", migration.description()));
            line
        })
        .collect()
}

/// Detail block of `show <rev>`
pub fn show_lines(chain: &RevisionChain, migration: &dyn Migration) -> Vec<String> {
    let mut lines = vec![
        format!("Rev: {}", migration.revision()),
        format!("Parent: {}", migration.down_revision().unwrap_or("<base>")),
    ];

    let children: Vec<&str> = chain
        .children(Some(migration.revision()))
        .into_iter()
        .map(|child| child.revision())
        .collect();
    if !children.is_empty() {
        lines.push(format!("Children: {}", children.join(", ")));
    }
    if !migration.branch_labels().is_empty() {
        lines.push(format!("Branch labels: {}", migration.branch_labels().join(", ")));
    }
    if !migration.depends_on().is_empty() {
        lines.push(format!("Depends on: {}", migration.depends_on().join(", ")));
    }
    if chain.heads().contains(&migration.revision()) {
        lines.push("Head: yes".to_string());
    }

    lines.push(String::new());
    lines.push(format!("    {}", migration.description()));

    let hazards = migration.downgrade_hazards();
    if !hazards.is_empty() {
        lines.push(String::new());
        lines.push("Downgrade hazards:".to_string());
        lines.extend(hazards.iter().map(|hazard| format!("  - {}", hazard)));
    }
    lines
}

/// SQL comment opening an offline script
pub fn script_header(direction: Direction, from: Option<&str>, to: Option<&str>) -> String {
    format!(
        "-- Running {} {} -> {}\n",
        direction,
        format_revision(from),
        format_revision(to)
    )
}
