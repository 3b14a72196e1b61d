//! Build script for strand-runtime
//!
//! Handles configuration merging:
//! 1. Start with library defaults
//! 2. If STRAND_CONFIG_RS env var is set, parse the user's config file
//! 3. Merge user values over defaults (user wins)
//! 4. Generate OUT_DIR/strand_merged_config.rs
//!
//! The user file only lists the values it changes, e.g.
//!
//! ```text
//! pub const STACK_SIZE: usize = 512 * 1024;
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

/// Configuration parameter definition
struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

/// All configuration parameters with their defaults
const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "STACK_SIZE",
        rust_type: "usize",
        default_value: "256 * 1024",
    },
    ConfigParam {
        name: "GUARD_SIZE",
        rust_type: "usize",
        default_value: "4096",
    },
    ConfigParam {
        name: "LISTEN_BACKLOG",
        rust_type: "i32",
        default_value: "128",
    },
    ConfigParam {
        name: "MAX_EVENTS",
        rust_type: "usize",
        default_value: "256",
    },
    ConfigParam {
        name: "DEBUG_LOGGING",
        rust_type: "bool",
        default_value: "false",
    },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("strand_merged_config.rs");

    let mut config: HashMap<&'static str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let user_path = env::var("STRAND_CONFIG_RS").ok();
    if let Some(path) = &user_path {
        println!("cargo:rerun-if-changed={}", path);
        match fs::read_to_string(path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using custom config: {}", path);
            }
            Err(e) => {
                println!("cargo:warning=Failed to read STRAND_CONFIG_RS ({}): {}", path, e);
            }
        }
    }
    println!("cargo:rerun-if-env-changed=STRAND_CONFIG_RS");

    let output = generate_config(&config, user_path.is_some());
    fs::write(&dest_path, output).expect("Failed to write merged config");
}

/// Parse the user's config file and merge known values into `config`
fn parse_and_merge(content: &str, config: &mut HashMap<&'static str, String>) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") || !line.starts_with("pub const ") {
            continue;
        }
        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };
        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => println!("cargo:warning=Unknown config parameter: {}", name),
        }
    }
}

/// Parse `pub const NAME: TYPE = VALUE;` into (name, value)
fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();

    let colon_pos = rest.find(':')?;
    let name = rest[..colon_pos].trim().to_string();

    let eq_pos = rest.find('=')?;
    let semi_pos = rest.rfind(';').unwrap_or(rest.len());
    if semi_pos <= eq_pos {
        return None;
    }
    let value = rest[eq_pos + 1..semi_pos].trim().to_string();

    Some((name, value))
}

/// Render the merged constants
fn generate_config(config: &HashMap<&'static str, String>, has_user_file: bool) -> String {
    let mut output = String::new();
    output.push_str("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Configuration merged from library defaults");
    if has_user_file {
        output.push_str(" and STRAND_CONFIG_RS");
    }
    output.push_str("\n\n");

    for param in CONFIG_PARAMS {
        let value = config
            .get(param.name)
            .map(String::as_str)
            .unwrap_or(param.default_value);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_const_line() {
        assert_eq!(
            parse_const_line("pub const LISTEN_BACKLOG: i32 = 1024;"),
            Some(("LISTEN_BACKLOG".into(), "1024".into()))
        );
        assert_eq!(
            parse_const_line("pub const STACK_SIZE: usize = 512 * 1024;"),
            Some(("STACK_SIZE".into(), "512 * 1024".into()))
        );
        assert_eq!(parse_const_line("pub const BROKEN"), None);
    }

    #[test]
    fn test_parse_and_merge() {
        let mut config: HashMap<&'static str, String> = HashMap::new();
        config.insert("STACK_SIZE", "256 * 1024".into());
        config.insert("DEBUG_LOGGING", "false".into());

        let user_config = r#"
            // Custom config
            pub const DEBUG_LOGGING: bool = true;
            pub const NOT_A_PARAM: u8 = 1;
        "#;
        parse_and_merge(user_config, &mut config);

        assert_eq!(config.get("DEBUG_LOGGING"), Some(&"true".to_string()));
        assert_eq!(config.get("STACK_SIZE"), Some(&"256 * 1024".to_string()));
        assert!(!config.contains_key("NOT_A_PARAM"));
    }
}
