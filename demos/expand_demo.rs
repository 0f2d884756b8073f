// Walkthrough of the template expander
//
// Demonstrates the binding features end to end:
// - Root binding and partial strings
// - Quote elision for non-string values
// - $data scoping and array fan-out
// - $when filtering
// - $root and $index inside a fan-out
// - Unresolved placeholders surviving expansion
//
// Run with: cargo run --example expand_demo
// Set RUST_LOG=trace to watch the walker's scope decisions.

use cardbind::expand;

fn main() {
    env_logger::init();

    println!("=== Template Expansion Demo ===\n");

    demo_root_binding();
    demo_quote_elision();
    demo_fan_out();
    demo_when_filtering();
    demo_reserved_names();
    demo_unresolved();
}

fn show(label: &str, template: &str, data: &str) {
    println!("--- {} ---", label);
    println!("  template: {}", template);
    println!("  data:     {}", data);
    match expand(template, data) {
        Ok(output) => println!("  output:   {}\n", output),
        Err(e) => println!("  error:    {}\n", e),
    }
}

fn demo_root_binding() {
    show(
        "Root binding",
        r#"{"type":"TextBlock","text":"Hello ${name}"}"#,
        r#"{"name":"Matt"}"#,
    );
}

fn demo_quote_elision() {
    show(
        "Quote elision",
        r#"{"count":"${n}","label":"${s}"}"#,
        r#"{"n":3,"s":"three"}"#,
    );
}

fn demo_fan_out() {
    show(
        "Array fan-out",
        r#"{"items":[{"$data":"${people}","type":"TextBlock","text":"${name}"}]}"#,
        r#"{"people":[{"name":"Ada"},{"name":"Grace"},{"name":"Edsger"}]}"#,
    );
}

fn demo_when_filtering() {
    show(
        "$when filtering",
        r#"{"items":[{"$data":"${orders}","$when":"${total >= 50}","id":"${id}"}]}"#,
        r#"{"orders":[{"id":1,"total":20},{"id":2,"total":75},{"id":3,"total":50}]}"#,
    );
}

fn demo_reserved_names() {
    show(
        "$root and $index",
        r#"{"rows":[{"$data":"${people}","text":"${$index}: ${name} / ${$root.team}"}]}"#,
        r#"{"team":"Compilers","people":[{"name":"Ada"},{"name":"Grace"}]}"#,
    );
}

fn demo_unresolved() {
    show(
        "Unresolved placeholder",
        r#"{"text":"${missing}"}"#,
        r#"{}"#,
    );
}
