//! Discover feed ranking.
//!
//! Candidates are scored by a weighted sum of social signals, popularity and
//! recency, plus a bounded random jitter that keeps the top of the feed from
//! settling. Weights come from configuration.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use coterie_common::{AppResult, config::DiscoverWeights};
use coterie_db::{
    entities::{collection, post},
    repositories::{CollectionRepository, FollowingRepository, PostRepository},
};
use coterie_queue::{RetryConfig, retry};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use tracing::debug;

use crate::services::friend_graph::FriendGraph;

/// Collections considered per request.
const COLLECTION_CANDIDATES: u64 = 200;
/// Posts considered per request.
const POST_CANDIDATES: u64 = 500;

/// Inputs to a discover score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverSignals {
    /// The viewer follows the creator.
    pub follows_creator: bool,
    /// Friends who are members of the collection.
    pub friends_joined: u32,
    /// Friends who starred the post.
    pub friends_starred: u32,
    /// Friends who posted into the collection.
    pub friends_posted: u32,
    /// Friends who follow the creator.
    pub friends_following_creator: u32,
    /// Member count for collections, star count for posts.
    pub popularity: u32,
    /// Time since creation.
    pub age: TimeDelta,
}

/// A candidate with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked<T> {
    pub item: T,
    pub score: f64,
}

fn recency(weights: &DiscoverWeights, age: TimeDelta) -> f64 {
    if weights.recency_window_hours <= 0.0 {
        return 0.0;
    }
    let age_hours = age.num_seconds() as f64 / 3600.0;
    weights.recency_max * (1.0 - age_hours / weights.recency_window_hours).clamp(0.0, 1.0)
}

fn shared_terms<R: Rng + ?Sized>(
    weights: &DiscoverWeights,
    signals: &DiscoverSignals,
    rng: &mut R,
) -> f64 {
    let mut score = 0.0;
    if signals.follows_creator {
        score += weights.follows_creator;
    }
    score += f64::from(signals.friends_following_creator) * weights.per_friend_following_creator;
    score += f64::from(signals.popularity).min(weights.popularity_cap) * weights.popularity;
    score += recency(weights, signals.age);
    if weights.jitter_max > 0.0 {
        score += rng.gen_range(0.0..=weights.jitter_max);
    }
    score
}

/// Score a collection. Stars do not apply.
pub fn score_collection<R: Rng + ?Sized>(
    weights: &DiscoverWeights,
    signals: &DiscoverSignals,
    rng: &mut R,
) -> f64 {
    f64::from(signals.friends_joined) * weights.per_friend_joined
        + f64::from(signals.friends_posted) * weights.per_friend_posted
        + shared_terms(weights, signals, rng)
}

/// Score a post.
pub fn score_post<R: Rng + ?Sized>(
    weights: &DiscoverWeights,
    signals: &DiscoverSignals,
    rng: &mut R,
) -> f64 {
    f64::from(signals.friends_joined) * weights.per_friend_joined
        + f64::from(signals.friends_starred) * weights.per_friend_starred
        + f64::from(signals.friends_posted) * weights.per_friend_posted
        + shared_terms(weights, signals, rng)
}

/// Highest `k` scores first. Equal scores keep their input order.
#[must_use]
pub fn rank_top_k<T>(scored: Vec<(T, f64)>, k: usize) -> Vec<Ranked<T>> {
    let mut scored = scored;
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
        .into_iter()
        .take(k)
        .map(|(item, score)| Ranked { item, score })
        .collect()
}

/// Social graph around a viewer, loaded once per request.
#[derive(Debug, Default)]
struct SocialContext {
    friends: HashSet<String>,
    hidden: HashSet<String>,
    followees: HashSet<String>,
    /// Creator ID -> friends following them.
    friend_followers: HashMap<String, u32>,
}

impl SocialContext {
    fn friends_in(&self, ids: &[String]) -> u32 {
        ids.iter().filter(|id| self.friends.contains(*id)).count() as u32
    }

    fn creator_signals(&self, creator_id: &str) -> (bool, u32) {
        (
            self.followees.contains(creator_id),
            self.friend_followers.get(creator_id).copied().unwrap_or(0),
        )
    }
}

fn age_of(created_at: DateTime<FixedOffset>, now: DateTime<Utc>) -> TimeDelta {
    (now - created_at.with_timezone(&Utc)).max(TimeDelta::zero())
}

/// Friend authors per collection.
fn friend_authors(ctx: &SocialContext, posts: &[post::Model]) -> HashMap<String, HashSet<String>> {
    let mut authors: HashMap<String, HashSet<String>> = HashMap::new();
    for post in posts.iter().filter(|p| ctx.friends.contains(&p.author_id)) {
        authors
            .entry(post.collection_id.clone())
            .or_default()
            .insert(post.author_id.clone());
    }
    authors
}

fn collection_signals(
    ctx: &SocialContext,
    collection: &collection::Model,
    authors: &HashMap<String, HashSet<String>>,
    now: DateTime<Utc>,
) -> DiscoverSignals {
    let members = collection.member_ids();
    let (follows_creator, friends_following_creator) = ctx.creator_signals(&collection.owner_id);
    DiscoverSignals {
        follows_creator,
        friends_joined: ctx.friends_in(&members),
        friends_starred: 0,
        friends_posted: authors.get(&collection.id).map_or(0, |a| a.len() as u32),
        friends_following_creator,
        popularity: members.len() as u32,
        age: age_of(collection.created_at, now),
    }
}

fn post_signals(
    ctx: &SocialContext,
    post: &post::Model,
    collection: Option<&collection::Model>,
    authors: &HashMap<String, HashSet<String>>,
    friend_stars: &HashMap<String, u32>,
    now: DateTime<Utc>,
) -> DiscoverSignals {
    let (follows_creator, friends_following_creator) = ctx.creator_signals(&post.author_id);
    let friends_posted = authors
        .get(&post.collection_id)
        .map_or(0, |a| a.iter().filter(|id| **id != post.author_id).count() as u32);
    DiscoverSignals {
        follows_creator,
        friends_joined: collection.map_or(0, |c| ctx.friends_in(&c.member_ids())),
        friends_starred: friend_stars.get(&post.id).copied().unwrap_or(0),
        friends_posted,
        friends_following_creator,
        popularity: post.star_count.max(0) as u32,
        age: age_of(post.created_at, now),
    }
}

/// Discover service.
#[derive(Clone)]
pub struct DiscoverService {
    collection_repo: CollectionRepository,
    post_repo: PostRepository,
    following_repo: FollowingRepository,
    graph: FriendGraph,
    weights: DiscoverWeights,
    retry_config: RetryConfig,
    seed: Option<u64>,
}

impl DiscoverService {
    /// Create a new discover service.
    #[must_use]
    pub fn new(
        collection_repo: CollectionRepository,
        post_repo: PostRepository,
        following_repo: FollowingRepository,
        graph: FriendGraph,
        weights: DiscoverWeights,
    ) -> Self {
        Self {
            collection_repo,
            post_repo,
            following_repo,
            graph,
            weights,
            retry_config: RetryConfig::default(),
            seed: None,
        }
    }

    /// Set the retry policy used for loads.
    pub fn set_retry_config(&mut self, retry_config: RetryConfig) {
        self.retry_config = retry_config;
    }

    /// Fix the jitter seed.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }

    fn rng(&self) -> StdRng {
        self.seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
    }

    async fn social_context(&self, viewer_id: &str) -> AppResult<SocialContext> {
        let graph = &self.graph;
        let mut hidden: HashSet<String> = retry(&self.retry_config, "discover.blocked", || {
            graph.blocked_ids(viewer_id)
        })
        .await?
        .into_iter()
        .collect();
        hidden.extend(
            retry(&self.retry_config, "discover.blocked_by", || {
                graph.blocked_by_ids(viewer_id)
            })
            .await?,
        );

        let friends: HashSet<String> = retry(&self.retry_config, "discover.friends", || {
            graph.friend_ids(viewer_id)
        })
        .await?
        .into_iter()
        .filter(|id| !hidden.contains(id))
        .collect();

        let followees: HashSet<String> = retry(&self.retry_config, "discover.followees", || {
            self.following_repo.followee_ids(viewer_id)
        })
        .await?
        .into_iter()
        .collect();

        let friend_list: Vec<String> = friends.iter().cloned().collect();
        let edges = retry(&self.retry_config, "discover.friend_follows", || {
            self.following_repo.find_by_followers(&friend_list)
        })
        .await?;
        let mut friend_followers: HashMap<String, u32> = HashMap::new();
        for edge in edges {
            *friend_followers.entry(edge.followee_id).or_default() += 1;
        }

        Ok(SocialContext {
            friends,
            hidden,
            followees,
            friend_followers,
        })
    }

    async fn visible_collections(
        &self,
        viewer_id: &str,
        ctx: &SocialContext,
    ) -> AppResult<Vec<collection::Model>> {
        let recent = retry(&self.retry_config, "discover.collections", || {
            self.collection_repo.find_recent_live(COLLECTION_CANDIDATES)
        })
        .await?;

        Ok(recent
            .into_iter()
            .filter(|c| c.is_visible_to(viewer_id) && !ctx.hidden.contains(&c.owner_id))
            .collect())
    }

    async fn posts_in(&self, collections: &[collection::Model]) -> AppResult<Vec<post::Model>> {
        let ids: Vec<String> = collections.iter().map(|c| c.id.clone()).collect();
        retry(&self.retry_config, "discover.posts", || {
            self.post_repo.find_recent_in_collections(&ids, POST_CANDIDATES)
        })
        .await
    }

    /// Collections the viewer has not joined, best first.
    pub async fn discover_collections(
        &self,
        viewer_id: &str,
        k: usize,
    ) -> AppResult<Vec<Ranked<collection::Model>>> {
        let ctx = self.social_context(viewer_id).await?;
        let candidates: Vec<_> = self
            .visible_collections(viewer_id, &ctx)
            .await?
            .into_iter()
            .filter(|c| !c.is_owner(viewer_id) && !c.is_member(viewer_id))
            .collect();
        let posts = self.posts_in(&candidates).await?;
        let authors = friend_authors(&ctx, &posts);

        let now = Utc::now();
        let mut rng = self.rng();
        let scored = candidates
            .into_iter()
            .map(|c| {
                let signals = collection_signals(&ctx, &c, &authors, now);
                let score = score_collection(&self.weights, &signals, &mut rng);
                (c, score)
            })
            .collect();

        let ranked = rank_top_k(scored, k);
        debug!(viewer_id, count = ranked.len(), "Ranked discover collections");
        Ok(ranked)
    }

    /// Posts from visible collections by other users, best first.
    pub async fn discover_posts(
        &self,
        viewer_id: &str,
        k: usize,
    ) -> AppResult<Vec<Ranked<post::Model>>> {
        let ctx = self.social_context(viewer_id).await?;
        let collections = self.visible_collections(viewer_id, &ctx).await?;
        let posts = self.posts_in(&collections).await?;
        let authors = friend_authors(&ctx, &posts);

        let candidates: Vec<post::Model> = posts
            .into_iter()
            .filter(|p| p.author_id != viewer_id && !ctx.hidden.contains(&p.author_id))
            .collect();

        let post_ids: Vec<String> = candidates.iter().map(|p| p.id.clone()).collect();
        let stars = retry(&self.retry_config, "discover.stars", || {
            self.post_repo.find_stars_for_posts(&post_ids)
        })
        .await?;
        let mut friend_stars: HashMap<String, u32> = HashMap::new();
        for star in stars.into_iter().filter(|s| ctx.friends.contains(&s.user_id)) {
            *friend_stars.entry(star.post_id).or_default() += 1;
        }

        let by_id: HashMap<&str, &collection::Model> =
            collections.iter().map(|c| (c.id.as_str(), c)).collect();

        let now = Utc::now();
        let mut rng = self.rng();
        let scored = candidates
            .into_iter()
            .map(|p| {
                let collection = by_id.get(p.collection_id.as_str()).copied();
                let signals = post_signals(&ctx, &p, collection, &authors, &friend_stars, now);
                let score = score_post(&self.weights, &signals, &mut rng);
                (p, score)
            })
            .collect();

        let ranked = rank_top_k(scored, k);
        debug!(viewer_id, count = ranked.len(), "Ranked discover posts");
        Ok(ranked)
    }
}

impl<T> Ranked<T> {
    /// Compare by score, highest first.
    #[must_use]
    pub fn cmp_score(&self, other: &Self) -> Ordering {
        other.score.total_cmp(&self.score)
    }
}
