use std::env;
use std::fs;

/// Variables lifted out of `.env` into `option_env!`
const ENV_KEYS: [&str; 5] = [
    "EPD_WIFI_SSID",
    "EPD_WIFI_PASS",
    "EPD_IMG_URL",
    "EPD_MQTT_HOST",
    "EPD_DEFAULT_SLEEP",
];

/// `KEY=value` lines, `#` comments, optional quotes around the value
fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

fn main() {
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    println!("cargo:rerun-if-changed=.env");
    for key in ENV_KEYS {
        println!("cargo:rerun-if-env-changed={}", key);
    }

    // the process environment wins over the file
    if let Ok(contents) = fs::read_to_string(".env") {
        for (key, value) in parse_env_file(&contents) {
            if ENV_KEYS.contains(&key.as_str()) && env::var(&key).is_err() {
                println!("cargo:rustc-env={}={}", key, value);
            }
        }
    } else {
        println!("cargo:warning=No .env file, using built-in defaults");
    }
}
