//! Output formatting utilities for the CLI
//!
//! Server tables and colored status messages for the terminal.

use tabled::{settings::Style, Table, Tabled};

use hp_core::{build_chain, ServerRegistry};

/// Format the configured servers as an ASCII table
///
/// The PATH column shows the tunnel chain from the entry hop to the server,
/// or the reason the chain cannot be built.
pub fn format_servers(registry: &ServerRegistry) -> String {
    if registry.is_empty() {
        return "No servers configured".to_string();
    }

    #[derive(Tabled)]
    struct ServerRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "USER")]
        user: String,
        #[tabled(rename = "AUTH")]
        auth: String,
        #[tabled(rename = "PATH")]
        path: String,
    }

    let rows: Vec<ServerRow> = registry
        .iter()
        .map(|server| ServerRow {
            name: server.name.clone(),
            address: server.endpoint().to_string(),
            user: server.username.clone(),
            auth: server.identification.kind().to_string(),
            path: match build_chain(registry, &server.name) {
                Ok(chain) => chain.path_description(),
                Err(e) => format!("invalid: {}", e),
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan to stderr
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
