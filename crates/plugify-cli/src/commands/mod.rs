pub mod config;
pub mod generate;
pub mod inspect;

use plugify_ast::AnnotationConventions;
use plugify_codegen::GenerationOptions;
use plugify_config::Config;
use plugify_manifest::{ManifestMetadata, PointerWidth};

/// `--pointer-width` values
pub fn parse_pointer_width(value: &str) -> Result<PointerWidth, String> {
    value
        .trim()
        .parse::<u8>()
        .ok()
        .and_then(PointerWidth::from_bits)
        .ok_or_else(|| format!("expected 32 or 64, got `{}`", value))
}

/// Generation options from the config file; a flag value wins over the file
pub fn options_from_config(config: &Config, pointer_width: Option<PointerWidth>) -> GenerationOptions {
    let pointer_width = pointer_width
        .or_else(|| config.pointer_width.and_then(PointerWidth::from_bits))
        .unwrap_or_default();
    GenerationOptions {
        pointer_width,
        conventions: AnnotationConventions::from_config(config),
        metadata: ManifestMetadata {
            schema: config.schema.clone(),
            description: config.description.clone(),
            author: config.author.clone(),
            website: config.website.clone(),
            license: config.license.clone(),
            entry: config.entry.clone(),
            language: config.language.clone(),
        },
        ..GenerationOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::*;

    #[test]
    fn test_parse_pointer_width() {
        assert_eq!(parse_pointer_width("32"), Ok(PointerWidth::Bits32));
        assert_eq!(parse_pointer_width("64"), Ok(PointerWidth::Bits64));
        assert!(parse_pointer_width("16").is_err());
        assert!(parse_pointer_width("wide").is_err());
    }

    #[test]
    fn test_flag_overrides_config_width() {
        let config = Config {
            pointer_width: Some(32),
            import_marker: Some("__ext_".to_string()),
            author: Some("Config Author".to_string()),
            ..Config::default()
        };
        let from_file = options_from_config(&config, None);
        assert_eq!(from_file.pointer_width, PointerWidth::Bits32);
        assert_eq!(from_file.conventions.import_marker, "__ext_");
        assert_eq!(from_file.metadata.author.as_deref(), Some("Config Author"));

        let from_flag = options_from_config(&config, Some(PointerWidth::Bits64));
        assert_eq!(from_flag.pointer_width, PointerWidth::Bits64);
    }
}
