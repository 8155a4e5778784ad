//! Per-author diversity cap.
//!
//! Soft cap: the first pass admits at most `max(1, floor(L × 0.2))`
//! posts per author in input order; if that leaves the page short, a
//! second pass refills from the skipped posts, again in input order,
//! until the page is full or candidates run out. Deterministic for a
//! given input order.

use crate::models::CandidatePost;
use std::collections::HashMap;
use uuid::Uuid;

/// Fraction of the page one author may claim before overflow kicks in.
const AUTHOR_SHARE: f64 = 0.2;

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorDiversityLimiter;

impl AuthorDiversityLimiter {
    pub fn author_cap(page_size: usize) -> usize {
        ((page_size as f64 * AUTHOR_SHARE).floor() as usize).max(1)
    }

    pub fn limit(&self, posts: Vec<CandidatePost>, page_size: usize) -> Vec<CandidatePost> {
        if page_size == 0 || posts.is_empty() {
            return Vec::new();
        }

        let cap = Self::author_cap(page_size);
        let mut per_author: HashMap<Uuid, usize> = HashMap::new();
        let mut selected = Vec::with_capacity(page_size);
        let mut overflow = Vec::new();

        for post in posts {
            if selected.len() >= page_size {
                break;
            }
            let count = per_author.entry(post.author_id).or_insert(0);
            if *count < cap {
                *count += 1;
                selected.push(post);
            } else {
                overflow.push(post);
            }
        }

        // Capped set smaller than the page: allow authors extra posts, in
        // original order, until the page fills or candidates are gone.
        for post in overflow {
            if selected.len() >= page_size {
                break;
            }
            selected.push(post);
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;
    use chrono::Utc;

    fn post(author_id: Uuid) -> CandidatePost {
        CandidatePost {
            id: Uuid::new_v4(),
            author_id,
            author_school_id: None,
            created_at: Utc::now(),
            text_len: 10,
            reaction_count: 0,
            reply_count: 0,
            renote_count: 0,
            visibility: Visibility::Public,
            is_local: true,
        }
    }

    #[test]
    fn test_author_cap_floor() {
        assert_eq!(AuthorDiversityLimiter::author_cap(10), 2);
        assert_eq!(AuthorDiversityLimiter::author_cap(20), 4);
        // Small pages still allow one post per author
        assert_eq!(AuthorDiversityLimiter::author_cap(3), 1);
        assert_eq!(AuthorDiversityLimiter::author_cap(1), 1);
    }

    #[test]
    fn test_cap_enforced_with_enough_authors() {
        let noisy = Uuid::new_v4();
        let mut posts: Vec<CandidatePost> = (0..6).map(|_| post(noisy)).collect();
        for _ in 0..8 {
            posts.push(post(Uuid::new_v4()));
        }

        let limited = AuthorDiversityLimiter.limit(posts, 10);

        assert_eq!(limited.len(), 10);
        let noisy_count = limited.iter().filter(|p| p.author_id == noisy).count();
        assert_eq!(noisy_count, 2, "cap is floor(10 * 0.2) = 2");
    }

    #[test]
    fn test_overflow_refills_short_pages_in_input_order() {
        let only = Uuid::new_v4();
        let posts: Vec<CandidatePost> = (0..5).map(|_| post(only)).collect();
        let input_ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();

        let limited = AuthorDiversityLimiter.limit(posts, 10);

        // One author cannot fill a page of 10 under the cap alone, so all
        // five posts come through, in their original order.
        let ids: Vec<Uuid> = limited.iter().map(|p| p.id).collect();
        assert_eq!(ids, input_ids);
    }

    #[test]
    fn test_overflow_stops_at_page_size() {
        let only = Uuid::new_v4();
        let posts: Vec<CandidatePost> = (0..20).map(|_| post(only)).collect();

        let limited = AuthorDiversityLimiter.limit(posts, 10);
        assert_eq!(limited.len(), 10);
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let posts: Vec<CandidatePost> = (0..12)
            .map(|i| post(if i % 2 == 0 { a } else { b }))
            .collect();

        let first = AuthorDiversityLimiter.limit(posts.clone(), 8);
        let second = AuthorDiversityLimiter.limit(posts, 8);

        let first_ids: Vec<Uuid> = first.iter().map(|p| p.id).collect();
        let second_ids: Vec<Uuid> = second.iter().map(|p| p.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_empty_and_zero_page() {
        assert!(AuthorDiversityLimiter.limit(vec![], 10).is_empty());
        assert!(AuthorDiversityLimiter
            .limit(vec![post(Uuid::new_v4())], 0)
            .is_empty());
    }
}
