//! 工具声明：file_search / code_interpreter / 用户自定义函数
//!
//! ToolSet 保持声明顺序并强制名称唯一；FunctionTool 的参数 Schema 可手写 JSON，
//! 也可用 schemars 从 Rust 类型自动生成。

use async_openai::types::{
    AssistantTools, AssistantToolsCode, AssistantToolsFileSearch, AssistantToolsFunction,
    FunctionObject,
};
use schemars::{schema_for, JsonSchema};
use serde_json::Value;

use crate::error::ErrorRecord;

/// 用户自定义函数声明：名称、描述与 JSON Schema 参数
#[derive(Debug, Clone)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// 从参数类型派生 JSON Schema
    pub fn from_schema<T: JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let schema = schema_for!(T);
        let parameters =
            serde_json::to_value(schema).unwrap_or_else(|_| Value::Object(Default::default()));
        Self::new(name, description, parameters)
    }
}

/// 单条工具声明
#[derive(Debug, Clone)]
pub enum ToolDecl {
    FileSearch,
    CodeInterpreter,
    Function(FunctionTool),
}

impl ToolDecl {
    /// 声明名：内置工具用其固定类型名，函数用函数名
    pub fn name(&self) -> &str {
        match self {
            ToolDecl::FileSearch => "file_search",
            ToolDecl::CodeInterpreter => "code_interpreter",
            ToolDecl::Function(f) => &f.name,
        }
    }

    /// 转为 API 工具类型
    pub(crate) fn to_api(&self) -> AssistantTools {
        match self {
            ToolDecl::FileSearch => AssistantTools::FileSearch(AssistantToolsFileSearch::default()),
            ToolDecl::CodeInterpreter => {
                AssistantTools::CodeInterpreter(AssistantToolsCode::default())
            }
            ToolDecl::Function(f) => AssistantTools::Function(AssistantToolsFunction {
                function: FunctionObject {
                    name: f.name.clone(),
                    description: Some(f.description.clone()),
                    parameters: Some(f.parameters.clone()),
                    strict: None,
                },
            }),
        }
    }
}

/// 有序且名称唯一的工具声明集合
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    decls: Vec<ToolDecl>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条声明；名称重复时返回 206 且集合不变
    pub fn push(&mut self, decl: ToolDecl) -> Result<(), ErrorRecord> {
        if self.contains_name(decl.name()) {
            return Err(ErrorRecord::emit(
                206,
                format!("duplicate tool name '{}'", decl.name()),
            ));
        }
        self.decls.push(decl);
        Ok(())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.decls.iter().any(|d| d.name() == name)
    }

    /// 确保 file_search 在集合中（助手创建时自动补齐）；已存在则不动
    pub fn ensure_file_search(&mut self) {
        if !self.contains_name("file_search") {
            self.decls.push(ToolDecl::FileSearch);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.decls.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDecl> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub(crate) fn to_api(&self) -> Vec<AssistantTools> {
        self.decls.iter().map(|d| d.to_api()).collect()
    }
}
