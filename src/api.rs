//! 远程翻译 API 客户端
//!
//! 定义 [`Translator`] 能力接口以及面向 DeepSeek 聊天补全接口的
//! 具体实现。每次调用只做一次请求，结果被分类为成功、限流、
//! 客户端错误或传输异常，本地退避与持久重试由调用方负责。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::constants;
use crate::config::AppConfig;
use crate::error::{ApiError, TranslationError, TranslationResult};
use crate::lexicon::Lexicon;

/// 基础系统提示词：面向日本声优综艺字幕的翻译要求
const BASE_SYSTEM_PROMPT: &str = "你是一位资深字幕翻译员，正在为一档日本女声优（2~3人的）综艺节目制作中文字幕。请将以下日语对话翻译成**生动、口语化、符合中文观众习惯**的字幕，要求：
- 保留说话人的性格特征（如元气、傲娇、毒舌等）
- 语气词要转化为中文等效表达（如「ね」→“嘛”、“对吧”；「わ」→“哦”、“啦”）
- 可适当使用网络流行语或综艺常用语（如“绝了”“上头”“破防”），但不要过度
- 使用中文全角标点，感叹号/问号可重复（！！？？）表达情绪
- 不要解释，只输出译文
- 不要添加额外说明";

/// 词典映射附加在系统提示词后的引导语
const LEXICON_PROMPT_HEADER: &str = "优先使用下列词典映射（若存在完全匹配，请直接使用对应翻译）：";

/// 上下文消息的固定结尾：只翻译 [NOW] 标记的那一行
const CONTEXT_PROMPT_FOOTER: &str = "请只翻译标记为 [NOW] 的那一行，且仅输出译文。";

/// 远程翻译能力
///
/// 单次尝试、不查本地缓存、不做本地重试。同步路径与后台重试
/// 工作器都通过这个接口调用远程服务，测试用脚本化实现替换。
#[async_trait]
pub trait Translator: Send + Sync {
    /// 发起一次翻译请求
    ///
    /// `lexicon` 与 `context` 只影响提示词内容；重试路径按设计
    /// 传 `None`。
    async fn translate_once(
        &self,
        text: &str,
        lexicon: Option<&Lexicon>,
        context: Option<&str>,
    ) -> Result<String, ApiError>;
}

/// DeepSeek 聊天补全客户端
pub struct DeepSeekClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    lexicon_max_chars: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl DeepSeekClient {
    /// 根据配置创建客户端
    pub fn new(config: &AppConfig) -> TranslationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(constants::REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TranslationError::ConfigError(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            lexicon_max_chars: config.lexicon_max_chars,
        })
    }

    /// 组装对话消息：系统提示词（含可选词典映射）、可选上下文、原文
    fn build_messages(
        &self,
        text: &str,
        lexicon: Option<&Lexicon>,
        context: Option<&str>,
    ) -> Vec<ChatMessage> {
        let lexicon_block = lexicon
            .map(|l| l.prompt_block(self.lexicon_max_chars))
            .unwrap_or_default();
        let system_content = if lexicon_block.is_empty() {
            BASE_SYSTEM_PROMPT.to_string()
        } else {
            format!(
                "{}\n\n{}\n{}",
                BASE_SYSTEM_PROMPT, LEXICON_PROMPT_HEADER, lexicon_block
            )
        };

        let mut messages = vec![ChatMessage {
            role: "system",
            content: system_content,
        }];

        if let Some(ctx) = context {
            let ctx = tail_chars(ctx, self.lexicon_max_chars);
            messages.push(ChatMessage {
                role: "user",
                content: format!("上下文（仅供参考）：\n{}\n\n{}", ctx, CONTEXT_PROMPT_FOOTER),
            });
        }

        messages.push(ChatMessage {
            role: "user",
            content: text.to_string(),
        });
        messages
    }
}

#[async_trait]
impl Translator for DeepSeekClient {
    async fn translate_once(
        &self,
        text: &str,
        lexicon: Option<&Lexicon>,
        context: Option<&str>,
    ) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let payload = ChatRequest {
            model: &self.model,
            messages: self.build_messages(text, lexicon, context),
            temperature: 0.1,
            max_tokens: 200,
        };

        tracing::debug!("调用翻译 API: {} (key: {})", url, mask_api_key(&self.api_key));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| ApiError::Transport(format!("解析响应失败: {}", e)))?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| ApiError::Transport("响应缺少 choices".to_string()))?;
            Ok(content.trim().to_string())
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(ApiError::RateLimited)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// 遮掩 API 密钥，日志里只保留前 8 个字符
fn mask_api_key(key: &str) -> String {
    if key.is_empty() {
        return "<unset>".to_string();
    }
    if key.chars().count() <= 8 {
        return "<masked>".to_string();
    }
    let prefix: String = key.chars().take(8).collect();
    format!("{}...", prefix)
}

/// 取字符串末尾至多 `max_chars` 个字符（按字符边界截断）
fn tail_chars(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let skip = count - max_chars;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}
