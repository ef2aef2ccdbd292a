//! Welcome banner for chat sessions.

use console::style;

/// Print the banner shown before the prompt appears.
pub fn print_welcome_banner(nickname: &str, vip: bool, personas: usize, restored: Option<usize>) {
    let tier = if vip {
        style("VIP").yellow().bold()
    } else {
        style("free").dim()
    };

    println!();
    println!("  {} {}", style("*").cyan().bold(), style("peerchat").cyan().bold());
    println!("  {}", style("Chat with people from around the world").dim());
    println!();
    println!("  {}  {}", style("Signed in as:").bold(), style(nickname).green());
    println!("  {}       {}", style("Account:").bold(), tier);
    println!("  {}        {}", style("Online:").bold(), style(personas).dim());
    if let Some(count) = restored.filter(|c| *c > 0) {
        println!(
            "  {}      {}",
            style("Restored:").bold(),
            style(format!("{count} messages")).dim()
        );
    }
    println!();
    println!("  {}", style("Type /help for commands, Ctrl+D to exit").dim());
    println!("  {}", style("---").dim());
}
