//! # I18n Unit Tests / I18n 单元测试
//!
//! Locale resolution and the consistency of the bundled translation files.
//!
//! 区域设置解析以及内置翻译文件的一致性。

use aux_runner::resolve_locale;
use std::collections::BTreeSet;

/// Collects the dotted keys of a locale file, e.g. `run.loading_config`.
fn keys(path: &str) -> BTreeSet<String> {
    let content = std::fs::read_to_string(path).unwrap();
    let table: toml::Table = toml::from_str(&content).unwrap();
    let mut keys = BTreeSet::new();
    for (section, value) in table {
        for key in value.as_table().unwrap().keys() {
            keys.insert(format!("{section}.{key}"));
        }
    }
    keys
}

#[cfg(test)]
mod resolve_locale_tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(resolve_locale("en"), "en");
        assert_eq!(resolve_locale("zh-CN"), "zh-CN");
    }

    #[test]
    fn test_case_and_separator_are_normalized() {
        assert_eq!(resolve_locale("zh_cn"), "zh-CN");
        assert_eq!(resolve_locale("ZH-cn"), "zh-CN");
    }

    #[test]
    fn test_language_part_fallback() {
        assert_eq!(resolve_locale("en-US"), "en");
        assert_eq!(resolve_locale("en_GB"), "en");
    }

    #[test]
    fn test_unknown_falls_back_to_english() {
        assert_eq!(resolve_locale("fr-FR"), "en");
        assert_eq!(resolve_locale(""), "en");
        assert_eq!(resolve_locale("invalid-lang"), "en");
    }
}

#[cfg(test)]
mod locale_file_tests {
    use super::*;

    #[test]
    fn test_translations_cover_the_same_keys() {
        let en = keys("locales/en.toml");
        let zh = keys("locales/zh-CN.toml");

        let missing_in_zh: Vec<_> = en.difference(&zh).collect();
        let missing_in_en: Vec<_> = zh.difference(&en).collect();
        assert!(missing_in_zh.is_empty(), "missing in zh-CN: {missing_in_zh:?}");
        assert!(missing_in_en.is_empty(), "missing in en: {missing_in_en:?}");
    }

    #[test]
    fn test_every_section_is_present() {
        let en = keys("locales/en.toml");
        for section in ["cli", "run", "report", "init"] {
            assert!(
                en.iter().any(|key| key.starts_with(&format!("{section}."))),
                "section '{section}' is empty"
            );
        }
    }
}
