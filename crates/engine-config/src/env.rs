use crate::settings::error::ConfigError;
use std::{collections::HashMap, fs, path::Path, str::FromStr};

/// Environment variable manager that loads from the process and `.env` files.
/// Values from a file override process variables of the same name.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn from_process() -> Self {
        EnvManager {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        EnvManager {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load variables from a .env file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::EnvFile {
            path: path.display().to_string(),
            source,
        })?;

        self.parse_env_content(&content)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Comma-separated list, blanks dropped.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::EnvSyntax(format!(
                    "malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::EnvSyntax(format!(
                    "empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars
                .insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();

        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }

        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_comments_quotes_and_exports() {
        let mut env = EnvManager::default();
        let content = r#"
# Comment
MATSYNC_WORKERS=4
export MATSYNC_TABLE_NAME="structures"
MATSYNC_API_BASE_URL='https://optimade.example/v1/structures'
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(env.get("MATSYNC_WORKERS"), Some("4"));
        assert_eq!(env.get("MATSYNC_TABLE_NAME"), Some("structures"));
        assert_eq!(
            env.get("MATSYNC_API_BASE_URL"),
            Some("https://optimade.example/v1/structures")
        );
    }

    #[test]
    fn rejects_lines_without_equals() {
        let mut env = EnvManager::default();
        assert!(matches!(
            env.parse_env_content("INVALID LINE WITHOUT EQUALS"),
            Err(ConfigError::EnvSyntax(_))
        ));
    }

    #[test]
    fn file_values_override_existing_ones() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MATSYNC_WORKERS=8").unwrap();

        let mut env = EnvManager::from_pairs([("MATSYNC_WORKERS", "2")]);
        env.load_from_file(file.path()).unwrap();

        assert_eq!(env.get_parsed::<usize>("MATSYNC_WORKERS").unwrap(), Some(8));
    }

    #[test]
    fn reports_unparsable_numbers() {
        let env = EnvManager::from_pairs([("MATSYNC_WORKERS", "many")]);
        let err = env.get_parsed::<usize>("MATSYNC_WORKERS").unwrap_err();
        assert!(err.to_string().contains("MATSYNC_WORKERS"));
    }

    #[test]
    fn splits_lists_and_treats_blank_as_unset() {
        let env = EnvManager::from_pairs([("A", "id, elements ,,nsites"), ("B", "")]);
        assert_eq!(
            env.get_list("A").unwrap(),
            vec!["id".to_string(), "elements".to_string(), "nsites".to_string()]
        );
        assert_eq!(env.get("B"), None);
    }
}
