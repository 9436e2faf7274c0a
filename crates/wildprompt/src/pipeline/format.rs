//! Final prompt assembly: person-count ordering, tag rewrites, dedup and
//! rendering.

use std::collections::HashSet;

use super::context::PromptContext;

pub const PARAGRAPH_BREAK: &str = "\n\n";

const PERSON_KINDS: [(&str, &str); 3] = [("boy", "boys"), ("girl", "girls"), ("other", "others")];

/// Literal corrections applied to main tags.
const TAG_REWRITES: &[(&str, &str)] = &[
    ("v", "peace sign"),
    ("double v", "double peace"),
    ("|_|", "bar eyes"),
    ("\\||/", "open \\m/"),
    (":|", "neutral face"),
    (";|", "neutral face"),
    ("eyepatch bikini", "square bikini"),
    ("tachi-e", "character image"),
];

/// Category rank of a person-count tag (`boys` < `girls` < `others`), or
/// `None` for any other tag. Recognizes `1boy`..`5boys` and `6+boys`.
pub fn person_category(tag: &str) -> Option<usize> {
    PERSON_KINDS
        .iter()
        .position(|(singular, plural)| {
            tag == format!("1{}", singular)
                || (2..=5).any(|n| tag == format!("{}{}", n, plural))
                || tag == format!("6+{}", plural)
        })
}

pub fn rewrite_tag(tag: &str) -> &str {
    TAG_REWRITES
        .iter()
        .find(|(from, _)| *from == tag)
        .map(|(_, to)| *to)
        .unwrap_or(tag)
}

/// First-seen dedup. Tags containing a paragraph break are always kept.
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| tag.contains(PARAGRAPH_BREAK) || seen.insert(tag.clone()))
        .collect()
}

/// Joins tags with `", "`. `#` tags become standalone lines and a bare
/// paragraph break renders as a blank line.
pub fn render_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| {
            if tag.starts_with('#') {
                format!("\n{}\n", tag)
            } else if tag == PARAGRAPH_BREAK {
                PARAGRAPH_BREAK.to_string()
            } else {
                tag.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs the whole final stage on a context and stores `final_prompt`.
///
/// Deferred wildcard tags are consumed here, so running the stage again
/// does not append them twice.
pub fn finalize(ctx: &mut PromptContext) {
    let deferred = std::mem::take(&mut ctx.global_append_tags);
    ctx.main_tags.extend(deferred);

    let (mut people, rest): (Vec<String>, Vec<String>) = std::mem::take(&mut ctx.main_tags)
        .into_iter()
        .partition(|tag| person_category(tag).is_some());
    people.sort_by_key(|tag| person_category(tag));

    let mut prefix = people;
    prefix.append(&mut ctx.prefix_tags);
    ctx.prefix_tags = prefix;

    ctx.main_tags = rest
        .iter()
        .map(|tag| rewrite_tag(tag).to_string())
        .collect();

    let combined: Vec<String> = ctx
        .prefix_tags
        .iter()
        .chain(ctx.main_tags.iter())
        .chain(ctx.postfix_tags.iter())
        .cloned()
        .collect();

    ctx.final_prompt = Some(render_tags(&dedup_tags(combined)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_person_category_closed_set() {
        assert_eq!(person_category("1boy"), Some(0));
        assert_eq!(person_category("3boys"), Some(0));
        assert_eq!(person_category("6+boys"), Some(0));
        assert_eq!(person_category("1girl"), Some(1));
        assert_eq!(person_category("5girls"), Some(1));
        assert_eq!(person_category("2others"), Some(2));
        assert_eq!(person_category("1boys"), None);
        assert_eq!(person_category("2boy"), None);
        assert_eq!(person_category("7girls"), None);
        assert_eq!(person_category("girl"), None);
    }

    #[test]
    fn test_rewrite_table() {
        assert_eq!(rewrite_tag("v"), "peace sign");
        assert_eq!(rewrite_tag("double v"), "double peace");
        assert_eq!(rewrite_tag("smile"), "smile");
    }

    #[test]
    fn test_dedup_keeps_paragraph_breaks() {
        let out = dedup_tags(tags(&["a", "\n\n", "b", "\n\n", "a"]));
        assert_eq!(out, tags(&["a", "\n\n", "b", "\n\n"]));
    }

    #[test]
    fn test_render_section_and_break() {
        let out = render_tags(&tags(&["a", "#scene", "b", "\n\n", "c"]));
        assert_eq!(out, "a, \n#scene\n, b, \n\n, c");
    }

    #[test]
    fn test_finalize_reorders_people_into_prefix() {
        let mut ctx = PromptContext::default();
        ctx.prefix_tags = tags(&["masterpiece"]);
        ctx.main_tags = tags(&["1girl", "scenery", "2boys"]);

        finalize(&mut ctx);

        assert_eq!(ctx.prefix_tags, tags(&["2boys", "1girl", "masterpiece"]));
        assert_eq!(ctx.main_tags, tags(&["scenery"]));
        assert_eq!(
            ctx.final_prompt.as_deref(),
            Some("2boys, 1girl, masterpiece, scenery")
        );
    }

    #[test]
    fn test_finalize_people_stable_within_category() {
        let mut ctx = PromptContext::default();
        ctx.main_tags = tags(&["1other", "2girls", "1boy", "1girl", "6+boys"]);

        finalize(&mut ctx);

        assert_eq!(ctx.prefix_tags, tags(&["1boy", "6+boys", "2girls", "1girl", "1other"]));
    }

    #[test]
    fn test_finalize_consumes_global_append_once() {
        let mut ctx = PromptContext::default();
        ctx.main_tags = tags(&["v", "smile"]);
        ctx.postfix_tags = tags(&["smile", "highres"]);
        ctx.global_append_tags = tags(&["ribbon"]);

        finalize(&mut ctx);
        let first = ctx.final_prompt.clone();
        finalize(&mut ctx);

        assert_eq!(first.as_deref(), Some("peace sign, smile, ribbon, highres"));
        assert_eq!(ctx.final_prompt, first);
        assert!(ctx.global_append_tags.is_empty());
    }
}
