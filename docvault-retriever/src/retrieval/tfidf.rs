//! Trainable TF-IDF vectorizer for the `tfidf` backend.
//!
//! The vocabulary is the `dimension` most frequent terms of the corpus (ties
//! broken alphabetically), laid out in alphabetical order. Vectors are raw
//! term counts weighted by smoothed IDF, `ln((1 + n) / (1 + df)) + 1`, then
//! L2-normalized. A corpus with fewer distinct terms than `dimension` leaves
//! the trailing components at zero, so every vector has exactly `dimension`
//! entries.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    dimension: usize,
    /// term -> component index
    vocabulary: BTreeMap<String, usize>,
    /// IDF weight per component; shorter than `dimension` when the vocabulary is
    idf: Vec<f32>,
    document_count: usize,
}

impl TfIdfVectorizer {
    /// Fit on `corpus`, keeping at most `dimension` terms.
    pub fn fit<'a, I>(corpus: I, dimension: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        let mut document_freq: HashMap<String, usize> = HashMap::new();
        let mut document_count = 0;

        for document in corpus {
            document_count += 1;
            let mut seen = HashSet::new();
            for token in tokenize(document) {
                *term_counts.entry(token.clone()).or_default() += 1;
                if seen.insert(token.clone()) {
                    *document_freq.entry(token).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|(a_term, a_count), (b_term, b_count)| {
            b_count.cmp(a_count).then_with(|| a_term.cmp(b_term))
        });
        ranked.truncate(dimension);

        let mut terms: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort();

        let n = document_count as f32;
        let idf = terms
            .iter()
            .map(|term| {
                let df = document_freq.get(term).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        let vocabulary = terms
            .into_iter()
            .enumerate()
            .map(|(i, term)| (term, i))
            .collect();

        Self {
            dimension,
            vocabulary,
            idf,
            document_count,
        }
    }

    /// Fit on `corpus` and return the vector of every document.
    pub fn fit_transform(corpus: &[&str], dimension: usize) -> (Self, Vec<Vec<f32>>) {
        let vectorizer = Self::fit(corpus.iter().copied(), dimension);
        let vectors = corpus.iter().map(|doc| vectorizer.transform(doc)).collect();
        (vectorizer, vectors)
    }

    /// Encode `text` with the fitted vocabulary; unknown terms are ignored.
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            if let Some(&i) = self.vocabulary.get(&token) {
                vector[i] += 1.0;
            }
        }
        for (value, weight) in vector.iter_mut().zip(&self.idf) {
            *value *= weight;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    /// Whether the fitted state is internally consistent; used when loading.
    pub fn is_consistent(&self) -> bool {
        self.vocabulary.len() == self.idf.len()
            && self.vocabulary.len() <= self.dimension
            && self.vocabulary.values().all(|&i| i < self.idf.len())
            && self.idf.iter().all(|w| w.is_finite())
    }
}

/// Lowercased runs of two or more word characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().nth(1).is_some())
        .map(str::to_lowercase)
}
