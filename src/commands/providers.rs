use ngdigest::config::{Config, ProviderKind};

/// Print every provider with its credential status and models
pub fn providers(config: &Config) {
    println!("AI Providers");
    println!("============");

    let available = config.available_providers();
    for kind in ProviderKind::ALL {
        let marker = if kind == config.provider { "*" } else { " " };
        let status = if available.contains(&kind) {
            "available"
        } else {
            "missing credentials"
        };
        println!("{marker} {:<9} {:<18} {status}", kind.as_str(), kind.display_name());

        if let Ok(settings) = config.provider_config(kind) {
            println!("    default model: {}", settings.default_model);
            println!("    candidates:    {}", settings.models.join(", "));
        }
        match kind.credential_vars() {
            [] => println!("    credentials:   none required"),
            vars => println!("    credentials:   {}", vars.join(" + ")),
        }
    }

    println!();
    println!("Selected: {} (* above)", config.provider);
    if available.is_empty() {
        println!("No provider has credentials configured.");
    }
}
