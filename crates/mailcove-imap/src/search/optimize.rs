//! Search query normalisation.
//!
//! A pure rewrite applied before emission: flattens nested conjunctions,
//! drops redundant `ALL` terms, and cancels double negation. The rewrite is
//! idempotent: `optimize(optimize(q)) == optimize(q)`.

use super::SearchQuery;

/// Normalises a query tree.
#[must_use]
pub fn optimize(query: SearchQuery) -> SearchQuery {
    match query {
        SearchQuery::And(items) => {
            let mut flat = Vec::with_capacity(items.len());
            flatten_and(items, &mut flat);

            match flat.len() {
                0 => SearchQuery::All,
                1 => flat.into_iter().next().unwrap_or(SearchQuery::All),
                _ => SearchQuery::And(flat),
            }
        }
        SearchQuery::Or(a, b) => {
            let a = optimize(*a);
            let b = optimize(*b);
            // OR with ALL matches everything
            if a == SearchQuery::All || b == SearchQuery::All {
                SearchQuery::All
            } else {
                SearchQuery::Or(Box::new(a), Box::new(b))
            }
        }
        SearchQuery::Not(inner) => match optimize(*inner) {
            SearchQuery::Not(cancelled) => *cancelled,
            other => SearchQuery::Not(Box::new(other)),
        },
        SearchQuery::Fuzzy(inner) => SearchQuery::Fuzzy(Box::new(optimize(*inner))),
        other => other,
    }
}

/// Recursively flattens AND items, dropping `ALL` terms.
fn flatten_and(items: Vec<SearchQuery>, out: &mut Vec<SearchQuery>) {
    for item in items {
        match optimize(item) {
            SearchQuery::All => {}
            SearchQuery::And(nested) => flatten_and(nested, out),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::search::TextKind;

    fn subject(s: &str) -> SearchQuery {
        SearchQuery::Text(TextKind::Subject, s.to_string())
    }

    #[test]
    fn empty_and_becomes_all() {
        assert_eq!(optimize(SearchQuery::And(vec![])), SearchQuery::All);
    }

    #[test]
    fn singleton_and_collapses() {
        let q = SearchQuery::And(vec![SearchQuery::Unseen]);
        assert_eq!(optimize(q), SearchQuery::Unseen);
    }

    #[test]
    fn nested_ands_flatten() {
        let q = SearchQuery::And(vec![
            SearchQuery::Unseen,
            SearchQuery::And(vec![subject("a"), SearchQuery::And(vec![subject("b")])]),
        ]);
        assert_eq!(
            optimize(q),
            SearchQuery::And(vec![SearchQuery::Unseen, subject("a"), subject("b")])
        );
    }

    #[test]
    fn all_inside_and_is_dropped() {
        let q = SearchQuery::And(vec![SearchQuery::All, SearchQuery::Unseen]);
        assert_eq!(optimize(q), SearchQuery::Unseen);

        let q = SearchQuery::And(vec![SearchQuery::All, SearchQuery::All]);
        assert_eq!(optimize(q), SearchQuery::All);
    }

    #[test]
    fn double_negation_cancels() {
        let q = SearchQuery::Unseen.not().not();
        assert_eq!(optimize(q), SearchQuery::Unseen);

        let q = SearchQuery::Unseen.not().not().not();
        assert_eq!(optimize(q), SearchQuery::Unseen.not());
    }

    #[test]
    fn or_with_all_collapses() {
        let q = SearchQuery::All.or(SearchQuery::Unseen);
        assert_eq!(optimize(q), SearchQuery::All);
    }

    #[test]
    fn or_keeps_binary_form() {
        let q = subject("a").or(subject("b"));
        assert_eq!(optimize(q.clone()), q);
    }

    #[test]
    fn optimize_descends_into_fuzzy() {
        let q = SearchQuery::Fuzzy(Box::new(SearchQuery::And(vec![subject("a")])));
        assert_eq!(optimize(q), SearchQuery::Fuzzy(Box::new(subject("a"))));
    }

    #[test]
    fn optimize_is_idempotent() {
        let queries = vec![
            SearchQuery::And(vec![
                SearchQuery::All,
                SearchQuery::Unseen.not().not(),
                SearchQuery::And(vec![subject("x"), SearchQuery::All]),
            ]),
            SearchQuery::All.or(subject("y")),
            subject("a").or(subject("b")).not(),
        ];
        for q in queries {
            let once = optimize(q);
            assert_eq!(optimize(once.clone()), once);
        }
    }
}
