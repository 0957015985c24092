use crate::index::SearchHit;

/// Wording of the answer prompt that is not derived from the retrieved chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSettings {
    pub product_name: String,
    pub answer_language: String,
    pub max_context_chars: usize,
}

/// Fills the answer template. Pure: the same question and hits always give the same prompt.
pub fn build_answer_prompt(question: &str, hits: &[SearchHit], settings: &PromptSettings) -> String {
    let product = &settings.product_name;
    let language = &settings.answer_language;

    let mut context = String::new();
    for (i, hit) in hits.iter().enumerate() {
        context.push_str(&format!(
            "[文件 {}] 來源: {}\n內容:\n{}\n",
            i + 1,
            hit.meta.source_id,
            cap_chars(&hit.meta.text, settings.max_context_chars)
        ));
    }

    format!(
        "您是 {product} 軟體的專業助手，請基於以下參考文件的內容，用{language}回答我的問題。\n\
         如果參考文件中沒有足夠資訊，請坦誠表明無法回答，不要編造資訊。\n\
         請專注於回答與 {product} 相關的問題，若問題與 {product} 無關，請婉拒回答。\n\
         \n\
         參考文件:\n\
         {context}\n\
         我的問題是: {question}\n\
         \n\
         請提供詳細且實用的回答，使用{language}，並適當引用參考文件的內容。"
    )
}

fn cap_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
