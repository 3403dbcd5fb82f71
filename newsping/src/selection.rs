use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rand::Rng;
use sqlx::MySqlPool;

/// A news post as read from the content store.
///
/// The store owns the schema; this job only reads the three columns it
/// notifies about. The active-status flag stays in the WHERE clause and
/// never reaches the program.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NewsItem {
    #[sqlx(rename = "news_title")]
    pub title: String,
    /// May contain markup; the composer strips it before use.
    #[sqlx(rename = "news_description")]
    pub description: String,
    #[sqlx(rename = "news_date")]
    pub published_at: NaiveDateTime,
}

/// Fetches the candidate pool: active posts published within the last 7 days,
/// in random order, capped at 3. This is the job's single database read.
pub async fn fetch_recent_posts(pool: &MySqlPool) -> Result<Vec<NewsItem>> {
    let posts = sqlx::query_as::<_, NewsItem>(
        r#"
        SELECT news_title, news_description, news_date
        FROM tbl_news
        WHERE news_status = 1
          AND news_date >= DATE_SUB(CURRENT_TIMESTAMP, INTERVAL 7 DAY)
        ORDER BY RAND()
        LIMIT 3
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to query recent news posts")?;

    Ok(posts)
}

/// Picks 2 or 3 posts (clamped to what is available) uniformly at random
/// without replacement. An empty candidate list yields an empty selection:
/// that is the normal "nothing to notify about" outcome, not an error.
pub fn select_posts<R: Rng + ?Sized>(candidates: Vec<NewsItem>, rng: &mut R) -> Vec<NewsItem> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let want = rng.gen_range(2..=3usize).min(candidates.len());
    // sample() draws distinct index positions, so no post is picked twice
    let picked = rand::seq::index::sample(rng, candidates.len(), want);

    let mut slots: Vec<Option<NewsItem>> = candidates.into_iter().map(Some).collect();
    picked.into_iter().filter_map(|i| slots[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn post(title: &str) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            description: format!("description of {}", title),
            published_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn empty_candidates_yield_empty_selection() {
        let mut rng = StdRng::seed_from_u64(1);
        let selected = select_posts(Vec::new(), &mut rng);
        assert!(selected.is_empty());
    }

    #[test]
    fn selection_size_stays_within_bounds() {
        for n in 1..=6usize {
            for seed in 0..200u64 {
                let mut rng = StdRng::seed_from_u64(seed);
                let candidates: Vec<NewsItem> =
                    (0..n).map(|i| post(&format!("post-{}", i))).collect();
                let selected = select_posts(candidates, &mut rng);
                assert!(
                    !selected.is_empty() && selected.len() <= n.min(3),
                    "n={} seed={} gave {} posts",
                    n,
                    seed,
                    selected.len()
                );
            }
        }
    }

    #[test]
    fn selection_never_repeats_a_post() {
        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let candidates: Vec<NewsItem> =
                (0..5).map(|i| post(&format!("post-{}", i))).collect();
            let selected = select_posts(candidates, &mut rng);
            let titles: HashSet<&str> = selected.iter().map(|p| p.title.as_str()).collect();
            assert_eq!(titles.len(), selected.len(), "duplicate post for seed {}", seed);
        }
    }

    #[test]
    fn single_candidate_is_always_selected() {
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = select_posts(vec![post("only")], &mut rng);
            assert_eq!(selected.len(), 1);
            assert_eq!(selected[0].title, "only");
        }
    }
}
