use serde::{Deserialize, Serialize};

use super::response::LLMExtractionRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        let system = "You are a helpful assistant.".to_string();

        let user = concat!(
            "请从以下文本中提取实体和它们之间的关系，只输出一个 JSON 对象，不要附加任何解释。\n",
            "格式示例：\n",
            "{\"entities\": [\"实体1\", \"实体2\"], ",
            "\"relations\": [[\"实体1\", \"关系类型\", \"实体2\"]]}\n",
            "其中 entities 是字符串数组，relations 中每一项都是 [源实体, 关系类型, 目标实体] 三元组。"
        )
        .to_string();

        Self { system, user }
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: PromptTemplate,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    pub fn build(&self, text: &str) -> LLMExtractionRequest {
        LLMExtractionRequest {
            system_prompt: self.template.system.clone(),
            user_prompt: format!("{}\n文本：{}", self.template.user, text),
        }
    }
}
