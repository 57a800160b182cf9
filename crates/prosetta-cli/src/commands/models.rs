use super::{json_pretty, load_config, EXIT_SUCCESS};
use prosetta_ollama::OllamaClient;

pub fn run(json: bool) -> Result<u8, String> {
    let config = load_config()?;
    let client = OllamaClient::new(config.ollama.clone());
    let models = client
        .list_models()
        .map_err(|e| format!("failed to list models: {e}"))?;

    if json {
        println!("{}", json_pretty(&models)?);
    } else if models.is_empty() {
        println!("no models installed (try `ollama pull {}`)", config.ollama.default_model);
    } else {
        println!("{:<32} {:>10}  MODIFIED", "NAME", "SIZE");
        for model in &models {
            let marker = if model.name == config.ollama.default_model {
                "*"
            } else {
                " "
            };
            println!(
                "{marker}{:<31} {:>10}  {}",
                model.name,
                format_size(model.size),
                model.modified_at
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

fn format_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{} MB", bytes / MB)
    } else {
        format!("{bytes} B")
    }
}
