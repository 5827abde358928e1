//! Extraction prompt.

use kfuse_core::types::Category;

/// Goal and rules sent ahead of every chunk.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub goal: String,
    pub rules: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        let categories: Vec<&str> = Category::all().iter().map(|c| c.as_str()).collect();
        Self {
            goal: format!(
                "You are an intelligence analyst. Extract every named entity in the input, \
                 its attributes, and the relationships between entities. \
                 Entity types: {}. Return a JSON array.",
                categories.join(", ")
            ),
            rules: r#"
1. Return only the JSON array, without code fences or commentary.
2. Only extract entities with a definite name; skip unnamed or generic ones.
3. Keep the sentence each entity was found in as "key sentence".
4. Omit attributes with empty values.
5. Job titles are attributes of a person, not persons.
6. Weapons must have a specific model; generic terms like "rifle" are skipped.
7. Incidents must carry time and location attributes.
8. Keep relation descriptions short.
9. Extract only what the input states.

Each array element has this shape:
{"entities": [{"id": "entity1", "type": "person", "name": "...", "key sentence": "...", "attributes": {"...": "..."}}],
 "relationships": [{"source": "entity1", "target": "entity2", "relation": "..."}]}
"#
            .to_string(),
        }
    }
}

impl PromptTemplate {
    /// Full prompt for one chunk. Newlines in the chunk are flattened to spaces.
    pub fn render(&self, chunk: &str) -> String {
        format!(
            "##Goal\n{}\n##Rules{}\n##Input\n{}",
            self.goal.trim(),
            self.rules,
            chunk.replace(['\r', '\n'], " ")
        )
    }
}
