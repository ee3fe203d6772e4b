//! `config.yml` 的加载、补全与带注释写出。
//!
//! 用户文件只需写想改的字段：读取时叠加在默认值之上，缺字段时会把完整配置连同注释写回。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读写配置 {path} 失败: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("配置 {path} 不是合法的 YAML: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("配置内容无效: {0}")]
    Invalid(String),
}

/// 可持久化为带注释 YAML 的配置类型。
pub trait YamlConfig: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
    /// `(字段名, 注释)`，顺序即写出顺序
    fn field_docs() -> &'static [(&'static str, &'static str)];
}

/// 读取 `<data_dir>/config.yml`（未指定时为当前目录），不存在则写出默认配置。
pub fn load_or_create<T: YamlConfig>(data_dir: Option<&Path>) -> Result<(T, PathBuf), ConfigError> {
    let path = data_dir.map_or_else(|| PathBuf::from(T::FILE_NAME), |d| d.join(T::FILE_NAME));

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let config = T::default();
            save(&config, &path)?;
            return Ok((config, path));
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };

    let user = parse_yaml(&raw, &path)?;
    let incomplete = match &user {
        Value::Mapping(map) => T::field_docs()
            .iter()
            .any(|(key, _)| !map.contains_key(*key)),
        _ => true,
    };
    let config = overlay_defaults::<T>(user)?;
    if incomplete {
        save(&config, &path)?;
    }
    Ok((config, path))
}

/// 解析 YAML 文本并叠加到默认值上。
pub fn parse_merged<T: YamlConfig>(raw: &str, path: &Path) -> Result<T, ConfigError> {
    overlay_defaults(parse_yaml(raw, path)?)
}

pub fn save<T: YamlConfig>(config: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, render_commented(config)?).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// 每个字段前加一行 `# 注释`。
pub fn render_commented<T: YamlConfig>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(values) = to_yaml(config)? else {
        return Err(ConfigError::Invalid("配置必须是键值映射".to_string()));
    };

    let mut out = String::new();
    for (key, doc) in T::field_docs() {
        let value = values.get(*key).cloned().unwrap_or(Value::Null);
        let mut single = Mapping::new();
        single.insert(Value::from(*key), value);
        let entry = serde_yaml::to_string(&single).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        out.push_str(&format!("# {doc}\n{}\n", entry.trim_end()));
    }
    Ok(out)
}

fn parse_yaml(raw: &str, path: &Path) -> Result<Value, ConfigError> {
    serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn to_yaml<T: Serialize>(value: &T) -> Result<Value, ConfigError> {
    serde_yaml::to_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
}

fn overlay_defaults<T: YamlConfig>(user: Value) -> Result<T, ConfigError> {
    let mut base = to_yaml(&T::default())?;
    overlay(&mut base, user);
    serde_yaml::from_value(base).map_err(|e| ConfigError::Invalid(e.to_string()))
}

fn overlay(base: &mut Value, user: Value) {
    match user {
        // 空文件解析为 Null
        Value::Null => {}
        Value::Mapping(fields) => match base {
            Value::Mapping(target) => {
                for (key, value) in fields {
                    match target.get_mut(&key) {
                        Some(slot) => overlay(slot, value),
                        None => {
                            target.insert(key, value);
                        }
                    }
                }
            }
            other => *other = Value::Mapping(fields),
        },
        value => *base = value,
    }
}
