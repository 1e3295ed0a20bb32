use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_CONFIG: &str = "config";
pub const ARG_DEBUG: &str = "debug";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("sigilo")
        .about("Short-lived SSH and X.509 credential issuance daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_CONFIG)
                .short('c')
                .long("config")
                .help("The filename of the configuration")
                .default_value("config.yml")
                .env("SIGILO_CONFIG"),
        )
        .arg(
            Arg::new(ARG_DEBUG)
                .short('d')
                .long("debug")
                .help("Enable debug messages to console")
                .env("SIGILO_DEBUG")
                .action(ArgAction::SetTrue),
        )
}
