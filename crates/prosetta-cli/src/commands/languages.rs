use super::{json_pretty, EXIT_SUCCESS};
use prosetta_config::SUPPORTED_LANGUAGES;

pub fn run(json: bool) -> Result<u8, String> {
    if json {
        let payload: Vec<_> = SUPPORTED_LANGUAGES
            .iter()
            .map(|(code, name)| serde_json::json!({"code": code, "name": name}))
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{:<6} NAME", "CODE");
        for (code, name) in SUPPORTED_LANGUAGES {
            println!("{code:<6} {name}");
        }
    }
    Ok(EXIT_SUCCESS)
}
