//! 词典模块 - 用户可编辑的精确匹配覆盖表
//!
//! 词典是权威的人工覆盖：命中即直接返回，完全绕过缓存与重试
//! 队列。词典文件为 TOML 格式的 `[entries]` 映射表，用户可随时
//! 编辑。词典内容还会被渲染为提示词片段，附在远程翻译请求里，
//! 引导模型优先采用已有的人工译法。

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TranslationError, TranslationResult};

/// 精确匹配词典
///
/// 条目存放在有序映射中，提示词渲染因此是确定性的。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lexicon {
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

impl Lexicon {
    /// 从 TOML 文件加载词典；文件不存在时返回空词典
    pub fn load(path: impl AsRef<Path>) -> TranslationResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取词典文件失败: {}", e)))?;
        Ok(toml::from_str(&content)?)
    }

    /// 若词典文件不存在则写入一个示例文件供用户编辑
    pub fn ensure_exists(path: impl AsRef<Path>) -> TranslationResult<()> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TranslationError::ConfigError(format!("创建词典目录失败: {}", e)))?;
        }
        let mut example = Lexicon::default();
        example.insert("こんにちは", "你好");
        example.insert("ありがとう", "谢谢");
        let content = toml::to_string_pretty(&example)
            .map_err(|e| TranslationError::ConfigError(format!("序列化词典失败: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入词典文件失败: {}", e)))?;
        Ok(())
    }

    /// 精确匹配查询（按修剪后的原文）
    pub fn lookup(&self, text: &str) -> Option<&str> {
        self.entries.get(text.trim()).map(String::as_str)
    }

    /// 添加或覆盖一个条目
    pub fn insert(&mut self, original: &str, translation: &str) {
        self.entries
            .insert(original.trim().to_string(), translation.trim().to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 渲染提示词片段：`原文 -> 译文` 每行一条
    ///
    /// 超过 `max_chars`（按字符计）时按整条截断，避免提示词过长。
    pub fn prompt_block(&self, max_chars: usize) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let full = self
            .entries
            .iter()
            .map(|(k, v)| format!("{} -> {}", k, v))
            .collect::<Vec<_>>()
            .join("\n");
        if full.chars().count() <= max_chars {
            return full;
        }
        let mut out = Vec::new();
        let mut total = 0;
        for (k, v) in &self.entries {
            let line = format!("{} -> {}", k, v);
            let line_chars = line.chars().count() + 1;
            if total + line_chars > max_chars {
                break;
            }
            total += line_chars;
            out.push(line);
        }
        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_trims_input() {
        let mut lexicon = Lexicon::default();
        lexicon.insert("こんにちは", "你好");

        assert_eq!(lexicon.lookup("こんにちは"), Some("你好"));
        assert_eq!(lexicon.lookup("  こんにちは  "), Some("你好"));
        assert_eq!(lexicon.lookup("さようなら"), None);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lexicon = Lexicon::load(dir.path().join("lexicon.toml")).unwrap();
        assert!(lexicon.is_empty());
    }

    #[test]
    fn ensure_exists_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon/lexicon.toml");

        Lexicon::ensure_exists(&path).unwrap();
        let lexicon = Lexicon::load(&path).unwrap();
        assert_eq!(lexicon.lookup("こんにちは"), Some("你好"));
        assert_eq!(lexicon.lookup("ありがとう"), Some("谢谢"));

        // 再次调用不覆盖已有文件
        Lexicon::ensure_exists(&path).unwrap();
        assert_eq!(Lexicon::load(&path).unwrap().len(), 2);
    }

    #[test]
    fn prompt_block_truncates_by_whole_entries() {
        let mut lexicon = Lexicon::default();
        lexicon.insert("あいうえお", "元气担当");
        lexicon.insert("かきくけこ", "毒舌担当");

        let full = lexicon.prompt_block(1500);
        assert!(full.contains("あいうえお -> 元气担当"));
        assert!(full.contains("かきくけこ -> 毒舌担当"));

        // 上限只够一条：整条保留，不出现半截行
        let truncated = lexicon.prompt_block(14);
        assert_eq!(truncated, "あいうえお -> 元气担当");

        assert_eq!(lexicon.prompt_block(0), "");
    }
}
