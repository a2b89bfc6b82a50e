//! Prompt construction for every judgment role. All prompts are Chinese; the
//! pipeline targets Chinese-language documents.

use crate::models::Paragraph;

pub const INTAKE_SYSTEM: &str = "\
你是一个智能助手，任务是从用户输入中提取以下信息：
1. 用户问题：用户想要查询的具体问题。
2. 文档路径：本地 PDF 文件的绝对路径。

请分析输入，返回严格的 JSON 格式：
{\"question\": \"提取的问题\", \"doc_path\": \"提取的文档路径\", \"reasoning\": \"提取的推理过程\"}

规则：
- 如果无法提取问题或路径，返回空字符串并在 reasoning 中说明原因。
- 路径应保留原始格式（包括斜杠或反斜杠）。
- 问题应简洁，聚焦核心查询内容。";

pub const COARSE_SYSTEM: &str = "\
你是一个文档导航助手。你对各行各业，特别是法律、医疗、金融、财税、编程等专业领域都有基本认知。你的任务是：
1. 确定文本块是否可能包含回答用户问题的信息。
2. 在 scratchpad 中记录你的推理过程以供后续参考。
3. 你挑选的文本块必须直接或间接与用户问题相关，避免选择完全不相关文本块。

首先仔细思考回答问题需要什么信息，然后评估文本块。";

pub const FINE_SYSTEM: &str = "\
你是一个文档分析专家，专职于为解答用户问题查找任何可参考的文档片段。
你的目标是：
1. 严格判断子块是否直接提供问题的准确答案或关键事实。
2. 仅选择包含完整、明确回答的子块，排除任何部分相关或间接关联的内容。
3. 记录详细推理，解释为何子块被选中或排除。

操作规则：
- 参考粗滤 scratchpad 提供的大致上下文，但决策完全基于子块自身内容。
- 答案必须具体且直接，例如数字、日期或明确陈述；模糊或推测性信息不予通过。
- 优先考虑子块与问题匹配的精确度，而非数量。";

pub const SYNTHESIS_SYSTEM: &str = "\
你是一个专业的文档问答助手。你将收到一个问题和若干按原文顺序排列的文档段落。
你的任务是仅依据这些段落回答问题：
- 回答必须完全基于给定段落，不得引入外部知识或猜测。
- 如果段落不足以回答问题，请明确说明无法从文档中找到答案。
- 回答使用中文，内容具体、简洁。";

pub const VERIFICATION_SYSTEM: &str = "\
你是一个严格的答案审核员。你将收到一个问题和一个候选答案。
请判断该答案是否直接、正确地回答了问题，并返回严格的 JSON 格式：
{\"is_correct\": true 或 false, \"reasoning\": \"审核推理\"}";

pub fn intake_prompt(user_input: &str) -> String {
    format!("用户输入：{user_input}\n请分析并提取问题和文档路径，返回 JSON 格式。")
}

pub fn coarse_prompt(question: &str, chunk_id: usize, chunk_text: &str) -> String {
    format!(
        "用户问题：{question}\n\n文本块（编号 {chunk_id}）：\n{chunk_text}\n\n\
         请评估该文本块与问题的相关性，返回严格的 JSON 格式：\n\
         {{\"is_relevant\": true 或 false, \"relevance\": 0.0 到 1.0 之间的数值, \"reasoning\": \"评估推理\"}}\n\
         不要输出 JSON 之外的任何内容。"
    )
}

pub fn fine_prompt(question: &str, sub_chunk_text: &str, scratchpad_json: &str) -> String {
    format!(
        "用户问题：{question}\n\n粗滤 scratchpad（供参考的上下文）：\n{scratchpad_json}\n\n\
         待评估子块：\n{sub_chunk_text}\n\n\
         请判断该子块是否直接包含问题的答案，返回严格的 JSON 格式：\n\
         {{\"is_selected\": true 或 false, \"reasoning\": \"判断推理\"}}\n\
         不要输出 JSON 之外的任何内容。"
    )
}

/// Paragraphs must already be in ascending id order; the prompt presents one
/// forward pass over the document.
pub fn synthesis_prompt(question: &str, paragraphs: &[Paragraph]) -> String {
    let mut context = String::new();
    for paragraph in paragraphs {
        context.push_str(&format!("【段落 {}】\n{}\n\n", paragraph.id, paragraph.text));
    }
    format!(
        "用户问题：{question}\n\n参考段落（按原文顺序排列）：\n{context}\
         请依据以上段落回答用户问题。"
    )
}

pub fn verification_prompt(question: &str, answer_text: &str) -> String {
    format!(
        "用户问题：{question}\n\n候选答案：\n{answer_text}\n\n\
         请审核该答案是否正确回答了问题，返回 JSON。"
    )
}
