use colored::Colorize;

/// Render report lines for terminal output.
pub fn render_report(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| colorize(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a section marker line.
pub fn marker(text: &str) -> String {
    text.yellow().to_string()
}

fn colorize(line: &str) -> String {
    if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("Missing") || line.starts_with("New") || line.starts_with("Changed")
    {
        line.yellow().to_string()
    } else {
        line.to_string()
    }
}
