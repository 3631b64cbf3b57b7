//! Selector lists and nesting.

use crate::token::{render_compact, split_top_level, Token, TokenKind};

/// Split a selector list at top-level commas (`:is(a, b)` stays whole),
/// rendering each term with whitespace collapsed.
pub fn split_selector_terms(selector: &[Token]) -> Vec<String> {
    split_top_level(selector, TokenKind::Comma)
        .into_iter()
        .map(render_compact)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Nest `child_terms` inside `parent_terms`. `&` stands for the parent; a
/// child without `&` becomes a descendant. Every combination is produced,
/// parent-major, and a term with several `&` takes every parent in each.
pub fn combine_selectors(parent_terms: &[String], child_terms: &[String]) -> Vec<String> {
    if parent_terms.is_empty() {
        return child_terms
            .iter()
            .map(|child| child.replace('&', "").trim().to_string())
            .collect();
    }

    let mut results = Vec::new();
    for parent in parent_terms {
        for child in child_terms {
            let pieces: Vec<&str> = child.split('&').collect();
            match pieces.len() {
                1 => results.push(format!("{} {}", parent, child.trim())),
                2 => results.push(format!("{}{}{}", pieces[0], parent, pieces[1])),
                _ => {
                    // the first `&` follows the outer loop, the rest range
                    // over every parent
                    let mut partial = vec![format!("{}{}", pieces[0], parent)];
                    for piece in &pieces[1..pieces.len() - 1] {
                        partial = partial
                            .iter()
                            .flat_map(|p| parent_terms.iter().map(move |q| format!("{}{}{}", p, piece, q)))
                            .collect();
                    }
                    let last = pieces[pieces.len() - 1];
                    results.extend(partial.into_iter().map(|p| format!("{}{}", p, last)));
                }
            }
        }
    }
    dedupe(results)
}

/// Drop repeated selectors, keeping the first occurrence.
pub fn dedupe(selectors: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    selectors
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Replace `target` inside each selector with every extender, for
/// `:extend(target all)`.
pub fn substitute_all(selectors: &[String], target: &str, extenders: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for selector in selectors {
        if selector.contains(target) {
            for extender in extenders {
                out.push(selector.replace(target, extender));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn terms(src: &str) -> Vec<String> {
        split_selector_terms(&Tokenizer::new().tokenize(src, "t.less"))
    }

    fn s(list: &[&str]) -> Vec<String> {
        list.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn splits_top_level_commas_only() {
        assert_eq!(terms(".a,\n  .b > p"), s(&[".a", ".b > p"]));
        assert_eq!(terms(":is(.a, .b) span"), s(&[":is(.a, .b) span"]));
    }

    #[test]
    fn descendant_nesting_is_parent_major() {
        let got = combine_selectors(&s(&[".foo", ".bar"]), &s(&[".baz", ".qux"]));
        assert_eq!(got, s(&[".foo .baz", ".foo .qux", ".bar .baz", ".bar .qux"]));
    }

    #[test]
    fn ampersand_joins_to_parent() {
        assert_eq!(combine_selectors(&s(&[".btn"]), &s(&["&:hover"])), s(&[".btn:hover"]));
        assert_eq!(combine_selectors(&s(&[".btn"]), &s(&["&-primary"])), s(&[".btn-primary"]));
        assert_eq!(combine_selectors(&s(&[".a"]), &s(&[".no-js &"])), s(&[".no-js .a"]));
        assert_eq!(combine_selectors(&s(&[".a"]), &s(&["> li"])), s(&[".a > li"]));
        assert_eq!(combine_selectors(&[], &s(&[".root"])), s(&[".root"]));
    }

    #[test]
    fn several_ampersands_take_every_parent() {
        let got = combine_selectors(&s(&[".a", ".b"]), &s(&["& + &"]));
        assert_eq!(got, s(&[".a + .a", ".a + .b", ".b + .a", ".b + .b"]));
    }

    #[test]
    fn extend_all_substitutes() {
        let got = substitute_all(&s(&[".a:hover", ".b"]), ".a", &s(&[".x"]));
        assert_eq!(got, s(&[".x:hover"]));
    }
}
