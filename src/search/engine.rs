//! Search index - in-memory, additive full-text index / 搜索索引
//!
//! Primitive operations only / 只提供原语操作：
//! - index_batch: add works, keyed by relative path / 批量索引
//! - search: rank works by the number of matching fields / 搜索
//!
//! Matching: every indexed token matches the query terms it contains, so a
//! query term also finds longer tokens it is part of. Inside one field all
//! query terms must match. The score of a work is the number of fields that
//! matched, ties keep indexing order.

use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::schema::SearchField;
use super::tokenizer::Tokenize;
use crate::models::Work;

/// Inverted index of one field: token -> work positions / 单字段倒排索引
#[derive(Debug, Default)]
struct FieldIndex {
    postings: HashMap<String, Vec<usize>>,
}

impl FieldIndex {
    fn insert(&mut self, tokens: &[String], position: usize) {
        for token in tokens {
            let entry = self.postings.entry(token.clone()).or_default();
            // 同一作品内的重复词只记录一次
            if entry.last() != Some(&position) {
                entry.push(position);
            }
        }
    }

    /// Works with a token containing `term` / 包含该词的作品
    fn matching(&self, term: &str) -> BTreeSet<usize> {
        self.postings
            .iter()
            .filter(|(token, _)| token.contains(term))
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect()
    }

    /// Works matching every term / 匹配所有词的作品
    fn matching_all(&self, terms: &[String]) -> BTreeSet<usize> {
        let mut terms = terms.iter();
        let mut matched = match terms.next() {
            Some(term) => self.matching(term),
            None => return BTreeSet::new(),
        };
        for term in terms {
            if matched.is_empty() {
                break;
            }
            let next = self.matching(term);
            matched.retain(|position| next.contains(position));
        }
        matched
    }
}

/// Search index / 搜索索引
#[derive(Debug, Default)]
pub struct SearchIndex {
    /// Works in indexing order / 按索引顺序保存的作品
    works: Vec<Work>,
    keys: HashSet<String>,
    fields: [FieldIndex; 4],
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.works.len()
    }

    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }

    /// Indexed works in indexing order / 已索引的作品
    pub fn works(&self) -> &[Work] {
        &self.works
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.keys.contains(relative_path)
    }

    /// Index a batch of works (primitive operation) / 批量索引
    ///
    /// Works whose relative path is already indexed are skipped. Returns the
    /// number of works added.
    pub fn index_batch(&mut self, tokenizer: &dyn Tokenize, works: Vec<Work>) -> usize {
        let mut seen = HashSet::new();
        let works: Vec<Work> = works
            .into_iter()
            .filter(|work| !self.keys.contains(&work.relative_path) && seen.insert(work.relative_path.clone()))
            .collect();

        // 分词是最耗时的部分，并行处理
        let tokenized: Vec<[Vec<String>; 4]> = works
            .par_iter()
            .map(|work| SearchField::ALL.map(|field| tokenizer.tokenize(&field.text(work))))
            .collect();

        let added = works.len();
        for (work, field_tokens) in works.into_iter().zip(tokenized) {
            let position = self.works.len();
            for field in SearchField::ALL {
                self.fields[field.index()].insert(&field_tokens[field.index()], position);
            }
            self.keys.insert(work.relative_path.clone());
            self.works.push(work);
        }
        added
    }

    /// Search (primitive operation) / 搜索
    ///
    /// Returns matching works, most matched fields first. A query without
    /// any term yields no results.
    pub fn search(&self, tokenizer: &dyn Tokenize, query: &str) -> Vec<Work> {
        let mut terms = tokenizer.tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut frequency = vec![0usize; self.works.len()];
        for field in &self.fields {
            for position in field.matching_all(&terms) {
                frequency[position] += 1;
            }
        }

        let mut ranked: Vec<(usize, usize)> = frequency
            .into_iter()
            .enumerate()
            .filter(|(_, count)| *count > 0)
            .collect();
        // 稳定排序，相同分数保持索引顺序
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        ranked.into_iter().map(|(position, _)| self.works[position].clone()).collect()
    }
}
