//! 检索索引托管：向量库生命周期与文件挂载
//!
//! 一个 VectorIndex 持有至多一个远端向量库：active（有远端 id）或 detached
//! （删除后 id 清空）。对 detached 实例的操作在本地直接报 404 目录错误，
//! 不发起任何网络调用。

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    CreateFileRequest, CreateVectorStoreFileRequest, CreateVectorStoreRequest,
    FilePurpose as ApiFilePurpose, UpdateVectorStoreRequest, VectorStoreExpirationAfter,
    VectorStoreObject,
};
use async_openai::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ErrorRecord;

/// 上传文件的用途标签（固定枚举，其余取值在任何网络调用前拒绝）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilePurpose {
    #[default]
    Assistants,
    FineTune,
    Vision,
    Batch,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilePurpose::Assistants => "assistants",
            FilePurpose::FineTune => "fine-tune",
            FilePurpose::Vision => "vision",
            FilePurpose::Batch => "batch",
        }
    }

    fn to_api(self) -> ApiFilePurpose {
        match self {
            FilePurpose::Assistants => ApiFilePurpose::Assistants,
            FilePurpose::FineTune => ApiFilePurpose::FineTune,
            FilePurpose::Vision => ApiFilePurpose::Vision,
            FilePurpose::Batch => ApiFilePurpose::Batch,
        }
    }
}

impl FromStr for FilePurpose {
    type Err = ErrorRecord;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assistants" => Ok(FilePurpose::Assistants),
            "fine-tune" => Ok(FilePurpose::FineTune),
            "vision" => Ok(FilePurpose::Vision),
            "batch" => Ok(FilePurpose::Batch),
            other => Err(ErrorRecord::emit(406, other)),
        }
    }
}

/// 远端向量库的本地快照（随 create / adopt / modify 刷新）
#[derive(Debug, Clone, Serialize)]
pub struct IndexHandle {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: u64,
    pub remote_file_count: u32,
    pub usage_bytes: u64,
}

impl IndexHandle {
    fn from_remote(vs: &VectorStoreObject, fallback_name: &str) -> Self {
        Self {
            id: vs.id.clone(),
            name: vs.name.clone().unwrap_or_else(|| fallback_name.to_string()),
            status: status_str(&vs.status),
            created_at: vs.created_at as u64,
            remote_file_count: vs.file_counts.total,
            usage_bytes: vs.usage_bytes,
        }
    }
}

/// 属性快照（可序列化，供日志与调用方展示）
#[derive(Debug, Clone, Serialize)]
pub struct IndexAttributes {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: u64,
    pub expire_days: u32,
    /// 经由本管理器挂载的文件数
    pub file_count: usize,
    /// 最近一次远端快照里的文件总数
    pub remote_file_count: u32,
    pub usage_bytes: u64,
}

/// 检索索引管理器
pub struct VectorIndex {
    client: Client<OpenAIConfig>,
    name: String,
    expire_days: u32,
    instance: Option<IndexHandle>,
    /// 经由本管理器挂载的文件：file_id -> 挂载状态
    files: HashMap<String, String>,
}

impl VectorIndex {
    /// 创建远端向量库；expire_days == 0 表示不过期
    pub async fn create(
        client: Client<OpenAIConfig>,
        name: impl Into<String>,
        expire_days: u32,
    ) -> Result<Self, ErrorRecord> {
        let name = name.into();
        let request = CreateVectorStoreRequest {
            name: Some(name.clone()),
            expires_after: expiration(expire_days),
            ..Default::default()
        };

        let vs = client
            .vector_stores()
            .create(request)
            .await
            .map_err(|e| ErrorRecord::emit(401, e.to_string()))?;

        info!(id = %vs.id, name = %name, expire_days, "vector store created");
        Ok(Self {
            client,
            instance: Some(IndexHandle::from_remote(&vs, &name)),
            name,
            expire_days,
            files: HashMap::new(),
        })
    }

    /// 释放当前持有的向量库（若 active），再接管目标 id 指向的向量库。
    /// 目标 id 不存在时报 405，其余传输失败报 400。
    pub async fn adopt(&mut self, remote_id: &str) -> Result<(), ErrorRecord> {
        if self.instance.is_some() {
            self.delete(false).await?;
        }

        let vs = match self.client.vector_stores().retrieve(remote_id).await {
            Ok(vs) => vs,
            Err(OpenAIError::ApiError(api)) => {
                let not_found = api.code.as_deref() == Some("not_found")
                    || api.message.to_lowercase().contains("not found");
                let code = if not_found { 405 } else { 400 };
                let ctx = if not_found {
                    remote_id.to_string()
                } else {
                    api.message.clone()
                };
                return Err(ErrorRecord::emit(code, ctx));
            }
            Err(e) => return Err(ErrorRecord::emit(400, e.to_string())),
        };

        self.name = vs.name.clone().unwrap_or_else(|| self.name.clone());
        self.expire_days = vs
            .expires_after
            .as_ref()
            .map(|e| e.days as u32)
            .unwrap_or(0);
        self.instance = Some(IndexHandle::from_remote(&vs, &self.name));
        self.files.clear();
        info!(id = %remote_id, "vector store adopted");
        Ok(())
    }

    /// 挂载一个已上传的文件；返回其 file id，挂载状态记入内部映射
    pub async fn attach_existing_file(&mut self, file_id: &str) -> Result<String, ErrorRecord> {
        let store_id = self.active_id("attach_existing_file")?.to_string();

        let attached = self
            .client
            .vector_stores()
            .files(&store_id)
            .create(CreateVectorStoreFileRequest {
                file_id: file_id.to_string(),
                chunking_strategy: None,
            })
            .await
            .map_err(|e| ErrorRecord::emit(402, e.to_string()))?;

        let status = status_str(&attached.status);
        self.files.insert(file_id.to_string(), status);
        Ok(file_id.to_string())
    }

    /// 读取本地文件并上传，再挂载到向量库。
    /// 校验顺序：purpose（406）-> active（404）-> 文件可读（403），全部在上传之前。
    pub async fn attach_new_file(
        &mut self,
        path: impl AsRef<Path>,
        purpose: &str,
    ) -> Result<String, ErrorRecord> {
        let purpose = FilePurpose::from_str(purpose)?;
        self.active_id("attach_new_file")?;

        let path = path.as_ref();
        if !path.is_file() {
            return Err(ErrorRecord::emit(403, path.display().to_string()));
        }

        let uploaded = self
            .client
            .files()
            .create(CreateFileRequest {
                file: path.to_path_buf().into(),
                purpose: purpose.to_api(),
            })
            .await
            .map_err(|e| ErrorRecord::emit(402, format!("upload failed: {}", e)))?;

        self.attach_existing_file(&uploaded.id).await
    }

    /// 更新远端元数据（名称 / 过期窗口），并刷新本地快照
    pub async fn modify(
        &mut self,
        new_name: Option<&str>,
        new_expire_days: Option<u32>,
    ) -> Result<(), ErrorRecord> {
        let store_id = self.active_id("modify")?.to_string();

        if let Some(name) = new_name {
            self.name = name.to_string();
        }
        if let Some(days) = new_expire_days {
            self.expire_days = days;
        }

        let vs = self
            .client
            .vector_stores()
            .update(
                &store_id,
                UpdateVectorStoreRequest {
                    name: Some(self.name.clone()),
                    expires_after: expiration(self.expire_days),
                    metadata: None,
                },
            )
            .await
            .map_err(|e| ErrorRecord::emit(407, e.to_string()))?;

        self.instance = Some(IndexHandle::from_remote(&vs, &self.name));
        Ok(())
    }

    /// 删除远端向量库并清空本地 id；delete_attached 为 true 时先删除挂载过的远端文件
    pub async fn delete(&mut self, delete_attached: bool) -> Result<(), ErrorRecord> {
        let store_id = self.active_id("delete")?.to_string();

        if delete_attached {
            for file_id in self.files.keys() {
                self.client.files().delete(file_id).await.map_err(|e| {
                    ErrorRecord::emit(408, format!("attached file '{}': {}", file_id, e))
                })?;
            }
        }

        let response = self
            .client
            .vector_stores()
            .delete(&store_id)
            .await
            .map_err(|e| ErrorRecord::emit(408, e.to_string()))?;
        if !response.deleted {
            return Err(ErrorRecord::emit(408, "remote reported deleted=false"));
        }

        info!(id = %store_id, "vector store deleted");
        self.instance = None;
        self.files.clear();
        Ok(())
    }

    /// 属性快照；detached 时报 404
    pub fn attributes(&self) -> Result<IndexAttributes, ErrorRecord> {
        let handle = self
            .instance
            .as_ref()
            .ok_or_else(|| ErrorRecord::emit(404, "attributes"))?;
        Ok(IndexAttributes {
            id: handle.id.clone(),
            name: self.name.clone(),
            status: handle.status.clone(),
            created_at: handle.created_at,
            expire_days: self.expire_days,
            file_count: self.files.len(),
            remote_file_count: handle.remote_file_count,
            usage_bytes: handle.usage_bytes,
        })
    }

    pub fn is_active(&self) -> bool {
        self.instance.is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.instance.as_ref().map(|h| h.id.as_str())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expire_days(&self) -> u32 {
        self.expire_days
    }

    /// 经由本管理器挂载的文件数
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn attachment_status(&self, file_id: &str) -> Option<&str> {
        self.files.get(file_id).map(String::as_str)
    }

    fn active_id(&self, operation: &str) -> Result<&str, ErrorRecord> {
        match self.instance.as_ref() {
            Some(handle) => Ok(handle.id.as_str()),
            None => {
                warn!(operation, "operation on detached vector store");
                Err(ErrorRecord::emit(404, operation))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn stub(active: bool) -> Self {
        let instance = active.then(|| IndexHandle {
            id: "vs_stub".to_string(),
            name: "Vector_Storage".to_string(),
            status: "completed".to_string(),
            created_at: 0,
            remote_file_count: 0,
            usage_bytes: 0,
        });
        Self {
            client: Client::with_config(
                async_openai::config::OpenAIConfig::new().with_api_key("sk-test"),
            ),
            name: "Vector_Storage".to_string(),
            expire_days: 1,
            instance,
            files: HashMap::new(),
        }
    }
}

fn expiration(expire_days: u32) -> Option<VectorStoreExpirationAfter> {
    (expire_days > 0).then(|| VectorStoreExpirationAfter {
        anchor: "last_active_at".to_string(),
        days: expire_days as u16,
    })
}

/// 将 serde 序列化形式的状态枚举转成线格式字符串（如 "in_progress"）
fn status_str<T: Serialize>(status: &T) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
