use colored::Colorize;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Prints two-column rows as a table.
pub fn print_table(header: [&str; 2], rows: &[(String, String)]) {
    let mut builder = Builder::default();
    builder.push_record(header);
    for (key, value) in rows {
        builder.push_record([key.as_str(), value.as_str()]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}
