//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - symbolic algebra for quantum optical networks",
        style("QNET").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  qnet-algebra  Operator, state, circuit and SLH algebra");
    println!("  qnet-cli      Command-line interface");
    println!();
    println!("License:    {}", style("Apache-2.0").dim());
}
