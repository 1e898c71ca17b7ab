use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use crossterm::style::{Attribute, Stylize};
use unicode_width::UnicodeWidthStr;

// ═══════════════════════════════════════════════════════════════════════════════
// Clap Styles
// ═══════════════════════════════════════════════════════════════════════════════

pub fn get_styles() -> Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Magenta))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Magenta))),
        )
        .literal(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Palette
// ═══════════════════════════════════════════════════════════════════════════════

pub mod colors {
    use crossterm::style::Color;

    pub const ROSE: Color = Color::Rgb {
        r: 255,
        g: 110,
        b: 150,
    };
    pub const VIOLET: Color = Color::Rgb {
        r: 170,
        g: 120,
        b: 255,
    };
    pub const TEAL: Color = Color::Rgb {
        r: 60,
        g: 210,
        b: 200,
    };
    pub const GREEN: Color = Color::Rgb {
        r: 30,
        g: 215,
        b: 96,
    };
    pub const ORANGE: Color = Color::Rgb {
        r: 255,
        g: 165,
        b: 0,
    };
    pub const RED: Color = Color::Rgb {
        r: 255,
        g: 85,
        b: 85,
    };
    pub const DIM: Color = Color::Rgb {
        r: 128,
        g: 128,
        b: 128,
    };
    pub const WHITE: Color = Color::Rgb {
        r: 255,
        g: 255,
        b: 255,
    };
}

const SECTION_WIDTH: usize = 60;

pub fn print_banner() {
    let banner = r#"
    ███╗   ███╗ ██████╗  ██████╗ ██████╗ ██╗███████╗██╗   ██╗
    ████╗ ████║██╔═══██╗██╔═══██╗██╔══██╗██║██╔════╝╚██╗ ██╔╝
    ██╔████╔██║██║   ██║██║   ██║██║  ██║██║█████╗   ╚████╔╝
    ██║╚██╔╝██║██║   ██║██║   ██║██║  ██║██║██╔══╝    ╚██╔╝
    ██║ ╚═╝ ██║╚██████╔╝╚██████╔╝██████╔╝██║██║        ██║
    ╚═╝     ╚═╝ ╚═════╝  ╚═════╝ ╚═════╝ ╚═╝╚═╝        ╚═╝
"#;

    let gradient = [
        colors::ROSE,
        colors::ROSE,
        colors::VIOLET,
        colors::VIOLET,
        colors::TEAL,
        colors::TEAL,
        colors::TEAL,
    ];
    for (i, line) in banner.lines().enumerate() {
        let color = gradient.get(i).unwrap_or(&colors::TEAL);
        println!("{}", line.with(*color).bold());
    }
    println!("{}", "  ─────────────  USER ADMIN CLI  ─────────────".with(colors::DIM));
    println!();
}

pub fn print_success(message: &str) {
    println!(" {} {}", "✓".with(colors::GREEN).bold(), message.with(colors::GREEN));
}

pub fn print_error(message: &str) {
    println!(" {} {}", "✗".with(colors::RED).bold(), message.with(colors::RED));
}

pub fn print_warning(message: &str) {
    println!(" {} {}", "⚠".with(colors::ORANGE).bold(), message.with(colors::ORANGE));
}

pub fn print_section_header(title: &str) {
    let title_len = title.width();
    let padding = SECTION_WIDTH.saturating_sub(title_len + 4) / 2;
    let rest = SECTION_WIDTH.saturating_sub(title_len + 4 + padding);

    println!();
    println!(
        "{}{} {} {}{}",
        "╭".with(colors::VIOLET),
        "─".repeat(padding).with(colors::VIOLET),
        title.with(colors::VIOLET).bold().attribute(Attribute::Italic),
        "─".repeat(rest).with(colors::VIOLET),
        "╮".with(colors::VIOLET)
    );
}

pub fn print_section_footer() {
    println!(
        "{}{}{}",
        "╰".with(colors::VIOLET),
        "─".repeat(SECTION_WIDTH).with(colors::VIOLET),
        "╯".with(colors::VIOLET)
    );
    println!();
}

pub fn print_key_value(key: &str, value: &str) {
    println!(
        "  {} {} {}",
        "●".with(colors::VIOLET),
        format!("{}:", key).with(colors::DIM),
        value.with(colors::WHITE)
    );
}

pub fn print_list_item(item: &str, indent: usize) {
    println!(
        "{}{}  {}",
        "  ".repeat(indent),
        "▶".with(colors::TEAL),
        item.with(colors::WHITE)
    );
}

pub fn print_empty_list(message: &str) {
    println!(
        "  {} {}",
        "○".with(colors::DIM),
        message.with(colors::DIM).attribute(Attribute::Italic)
    );
}

pub fn get_prompt() -> String {
    format!("{} ", "♪❯".with(colors::ROSE).bold())
}

pub fn print_command_echo(command: &str) {
    println!("{}  {}", "♪❯".with(colors::ROSE).bold(), command.with(colors::GREEN).bold());
}

pub fn print_goodbye() {
    println!();
    println!("  {}", "Bye! Keep listening.".with(colors::VIOLET).bold());
    println!();
}
