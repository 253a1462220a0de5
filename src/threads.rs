//! 会话目录：人类可读别名 -> 远端线程句柄
//!
//! 别名与线程 id 在一个目录实例内互为双射；重复映射在任何网络调用前报 100。
//! 线程删除暂未提供（上层会话历史按 append-only 使用）。

use std::collections::HashMap;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    AssistantToolsFileSearch, CreateMessageRequest, CreateMessageRequestContent,
    CreateThreadRequest, MessageAttachment, MessageAttachmentTool, MessageRole, ThreadObject,
};
use async_openai::Client;
use tracing::info;

use crate::error::ErrorRecord;

/// 目录内一条线程记录：远端 id 与经由本目录追加的消息 id（按追加顺序）
#[derive(Debug, Clone)]
pub struct ThreadRecord {
    pub id: String,
    pub message_ids: Vec<String>,
}

/// 会话目录
pub struct ThreadDirectory {
    client: Client<OpenAIConfig>,
    threads: HashMap<String, ThreadRecord>,
}

impl ThreadDirectory {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self {
            client,
            threads: HashMap::new(),
        }
    }

    /// 新建远端线程并绑定到 alias；别名重复在任何网络调用前报 100
    pub async fn create_thread(&mut self, alias: &str) -> Result<String, ErrorRecord> {
        self.ensure_alias_free(alias)?;

        let thread = self
            .client
            .threads()
            .create(CreateThreadRequest::default())
            .await
            .map_err(|e| ErrorRecord::emit(101, e.to_string()))?;

        info!(alias, thread_id = %thread.id, "thread created");
        self.threads.insert(
            alias.to_string(),
            ThreadRecord {
                id: thread.id.clone(),
                message_ids: Vec::new(),
            },
        );
        Ok(thread.id)
    }

    /// 将一个已存在的远端线程 id 绑定到 alias（纯本地登记）。
    /// 别名或线程 id 任一已被映射都破坏双射，报 100 且目录不变。
    pub fn adopt_thread(&mut self, alias: &str, thread_id: &str) -> Result<(), ErrorRecord> {
        self.ensure_alias_free(alias)?;
        if self.threads.values().any(|r| r.id == thread_id) {
            return Err(ErrorRecord::emit(100, thread_id));
        }

        self.threads.insert(
            alias.to_string(),
            ThreadRecord {
                id: thread_id.to_string(),
                message_ids: Vec::new(),
            },
        );
        Ok(())
    }

    /// 拉取别名对应的远端线程对象（103 未知别名 / 102 传输失败）
    pub async fn retrieve_thread(&self, alias: &str) -> Result<ThreadObject, ErrorRecord> {
        let record = self.record_of(alias)?;
        self.client
            .threads()
            .retrieve(&record.id)
            .await
            .map_err(|e| ErrorRecord::emit(102, e.to_string()))
    }

    /// 向别名对应的线程追加一条用户消息，返回消息 id
    pub async fn create_message(
        &mut self,
        alias: &str,
        content: &str,
    ) -> Result<String, ErrorRecord> {
        self.append_message(alias, content, None).await
    }

    /// 追加一条带 file_search 附件的用户消息
    pub async fn create_message_with_attachment(
        &mut self,
        alias: &str,
        content: &str,
        file_id: &str,
    ) -> Result<String, ErrorRecord> {
        self.append_message(alias, content, Some(file_id)).await
    }

    async fn append_message(
        &mut self,
        alias: &str,
        content: &str,
        attachment: Option<&str>,
    ) -> Result<String, ErrorRecord> {
        let thread_id = self.record_of(alias)?.id.clone();

        let request = CreateMessageRequest {
            role: MessageRole::User,
            content: CreateMessageRequestContent::Content(content.to_string()),
            attachments: attachment.map(|file_id| {
                vec![MessageAttachment {
                    file_id: file_id.to_string(),
                    tools: Some(vec![MessageAttachmentTool::FileSearch(
                        AssistantToolsFileSearch::default(),
                    )]),
                }]
            }),
            metadata: None,
        };

        let message = self
            .client
            .threads()
            .messages(&thread_id)
            .create(request)
            .await
            .map_err(|e| ErrorRecord::emit(104, e.to_string()))?;

        if let Some(record) = self.threads.get_mut(alias) {
            record.message_ids.push(message.id.clone());
        }
        Ok(message.id)
    }

    /// 本地改名（不触达远端）；103 未知旧别名 / 100 新别名已占用
    pub fn rename_alias(&mut self, old: &str, new: &str) -> Result<(), ErrorRecord> {
        if !self.threads.contains_key(old) {
            return Err(ErrorRecord::emit(103, old));
        }
        self.ensure_alias_free(new)?;

        if let Some(record) = self.threads.remove(old) {
            self.threads.insert(new.to_string(), record);
        }
        Ok(())
    }

    pub fn thread_id(&self, alias: &str) -> Option<&str> {
        self.threads.get(alias).map(|r| r.id.as_str())
    }

    pub fn record(&self, alias: &str) -> Option<&ThreadRecord> {
        self.threads.get(alias)
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.threads.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    fn ensure_alias_free(&self, alias: &str) -> Result<(), ErrorRecord> {
        if self.threads.contains_key(alias) {
            return Err(ErrorRecord::emit(100, alias));
        }
        Ok(())
    }

    fn record_of(&self, alias: &str) -> Result<&ThreadRecord, ErrorRecord> {
        self.threads
            .get(alias)
            .ok_or_else(|| ErrorRecord::emit(103, alias))
    }
}
