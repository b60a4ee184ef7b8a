// src/crawl/scorer.rs
// =============================================================================
// Ranking discovered URLs for best-first crawling.
//
// The score only looks at the URL text, never the page content: a page has
// to be ranked before it is fetched.
// =============================================================================

use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRelevanceScorer {
    keywords: Vec<String>,
    weight: f64,
}

impl KeywordRelevanceScorer {
    pub fn new<S: AsRef<str>>(keywords: &[S], weight: f64) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            weight,
        }
    }

    // weight * (keywords found in the URL / number of keywords)
    //
    // Matching is case-insensitive. A multi-word keyword also matches with
    // its spaces written as '-', '_' or '%20', the way they show up in paths.
    pub fn score(&self, url: &Url) -> f64 {
        if self.keywords.is_empty() {
            return 0.0;
        }

        let haystack = url.as_str().to_lowercase();
        let matched = self
            .keywords
            .iter()
            .filter(|keyword| keyword_variants(keyword).iter().any(|v| haystack.contains(v.as_str())))
            .count();

        self.weight * matched as f64 / self.keywords.len() as f64
    }
}

fn keyword_variants(keyword: &str) -> Vec<String> {
    if !keyword.contains(' ') {
        return vec![keyword.to_string()];
    }
    ["-", "_", "%20", " "]
        .iter()
        .map(|sep| keyword.split_whitespace().collect::<Vec<_>>().join(sep))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_score_is_weighted_fraction_of_matches() {
        let scorer = KeywordRelevanceScorer::new(&["crawl", "example", "async", "configuration"], 0.7);
        let score = scorer.score(&url("https://example.com/docs/Async-Crawl"));
        assert!((score - 0.7 * 3.0 / 4.0).abs() < 1e-9);
        assert_eq!(scorer.score(&url("https://other.org/")), 0.0);
    }

    #[test]
    fn test_multi_word_keyword_matches_path_spelling() {
        let scorer = KeywordRelevanceScorer::new(&["context manager"], 1.0);
        assert_eq!(scorer.score(&url("https://d.org/context-manager.html")), 1.0);
        assert_eq!(scorer.score(&url("https://d.org/context_manager")), 1.0);
        assert_eq!(scorer.score(&url("https://d.org/context")), 0.0);
    }

    #[test]
    fn test_no_keywords_scores_zero() {
        let scorer = KeywordRelevanceScorer::new::<&str>(&[], 0.8);
        assert_eq!(scorer.score(&url("https://a.com/tutorial")), 0.0);
    }
}
