//! Canned catalog items and provider replies.

use catalog_core::{
    CatalogItem, GeneratedContent, ItemGenerationState, ItemId, ProductAttributes, RawReply,
};
use serde_json::json;

const FILLER: [&str; 12] = [
    "deze", "fietstas", "biedt", "ruimte", "voor", "dagelijkse", "spullen", "en", "sluit",
    "netjes", "met", "klittenband",
];

/// `count` Dutch filler words separated by spaces.
pub fn filler_words(count: usize) -> String {
    FILLER
        .iter()
        .cycle()
        .take(count)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A catalog item without existing descriptions.
pub fn catalog_item(id: ItemId, title: &str, brand: &str) -> CatalogItem {
    CatalogItem {
        id,
        product: ProductAttributes {
            title: title.to_string(),
            brand: brand.to_string(),
            category: "Fietsaccessoires".to_string(),
            subcategory: String::new(),
            attributes: vec!["Kleur: Zwart".to_string()],
        },
        existing: GeneratedContent::default(),
        state: ItemGenerationState::default(),
    }
}

/// The same item with an existing long description.
pub fn with_description(mut item: CatalogItem, long: &str) -> CatalogItem {
    item.existing.long_description = Some(long.to_string());
    item
}

/// The same item, locked against generation.
pub fn locked(mut item: CatalogItem) -> CatalogItem {
    item.state.locked = true;
    item
}

/// Full-mode content that passes validation for every tier.
pub fn valid_content() -> GeneratedContent {
    GeneratedContent {
        short_description: Some(format!(
            "<p>{}.</p><ul><li>Waterafstotend</li><li>Twintig liter</li></ul>",
            filler_words(40)
        )),
        long_description: Some(format!(
            "<h3>Over dit product</h3><p>{}.</p><h3>Kenmerken</h3><p>{}.</p><h3>Gebruik</h3><p>{}.</p>",
            filler_words(90),
            filler_words(90),
            filler_words(60)
        )),
        meta_description: Some(
            "Basil fietstas van 20 liter met waterafstotende stof, reflecterende details en een stevige haak voor de bagagedrager."
                .to_string(),
        ),
    }
}

/// Content as the model would return it: a JSON object of the present fields.
pub fn content_json(content: &GeneratedContent) -> String {
    serde_json::to_string(content).unwrap_or_default()
}

/// A chat-completion response body carrying `text`.
pub fn completion_body(text: &str) -> String {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20}
    })
    .to_string()
}

/// HTTP 200 carrying `text` as the completion.
pub fn completion_reply(text: &str) -> RawReply {
    RawReply::new(200, completion_body(text))
}

/// HTTP 200 whose completion is the given content as JSON.
pub fn content_reply(content: &GeneratedContent) -> RawReply {
    completion_reply(&content_json(content))
}

/// Error reply in the OpenAI error shape.
pub fn error_reply(status: u16, message: &str) -> RawReply {
    RawReply::new(
        status,
        json!({"error": {"message": message, "type": "invalid_request_error"}}).to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::text::{plain_len, word_count};

    #[test]
    fn test_valid_content_meets_floors() {
        let content = valid_content();
        assert!(word_count(content.short_description.as_deref().unwrap()) >= 30);
        assert!(word_count(content.long_description.as_deref().unwrap()) >= 200);
        let meta = plain_len(content.meta_description.as_deref().unwrap());
        assert!((80..=165).contains(&meta));
    }

    #[test]
    fn test_content_json_skips_absent_fields() {
        let content = GeneratedContent {
            meta_description: Some("meta".to_string()),
            ..Default::default()
        };
        assert_eq!(content_json(&content), r#"{"meta_description":"meta"}"#);
    }
}
