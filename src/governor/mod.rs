//! Outbound-call governor for the generative-AI provider.
//!
//! Every logical call goes through the same pipeline: result cache lookup,
//! then pacing and classified retries around the provider, then a cache write
//! on success. One [`Governor`] is built per process and shared by reference,
//! so all callers draw from a single pacing budget.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::ProviderFailure,
    models::{Recommendation, RecommendationProfile},
    services::{
        profile, recommendations,
        vision::{self, IDENTIFY_PROMPT},
        GenerationRequest, GenerativeProvider, InlineImage,
    },
};

pub mod cache;
pub mod classify;
pub mod clock;
pub mod pacer;
pub mod retry;

pub use cache::{CacheKey, InMemoryResultCache, ResultCache};
pub use classify::{classify, ProviderErrorKind};
pub use clock::{Clock, ManualClock, TokioClock};
pub use pacer::{BudgetSnapshot, Pacer};
pub use retry::{Outcome, RetryPlan, Retrier, BLOCKED_ADVISORY};

/// Request sites that reach the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    Recommendation,
    Vision,
    Profile,
}

impl CallSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallSite::Recommendation => "recommendation",
            CallSite::Vision => "vision",
            CallSite::Profile => "profile",
        }
    }
}

/// Pacing, caching and retry settings for one call site
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub min_interval: Duration,
    pub ttl: Duration,
    pub retry: RetryPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GovernorPolicy {
    pub recommendation: CallPolicy,
    pub vision: CallPolicy,
    pub profile: CallPolicy,
    pub daily_call_limit: Option<u32>,
}

impl GovernorPolicy {
    pub fn for_site(&self, site: CallSite) -> &CallPolicy {
        match site {
            CallSite::Recommendation => &self.recommendation,
            CallSite::Vision => &self.vision,
            CallSite::Profile => &self.profile,
        }
    }
}

impl Default for GovernorPolicy {
    fn default() -> Self {
        const HOUR: u64 = 60 * 60;

        Self {
            recommendation: CallPolicy {
                min_interval: Duration::from_secs(5),
                ttl: Duration::from_secs(2 * HOUR),
                retry: RetryPlan::default(),
            },
            vision: CallPolicy {
                min_interval: Duration::from_secs(10),
                ttl: Duration::from_secs(24 * HOUR),
                retry: RetryPlan::default(),
            },
            profile: CallPolicy {
                min_interval: Duration::from_secs(5),
                ttl: Duration::from_secs(24 * HOUR),
                retry: RetryPlan::default(),
            },
            daily_call_limit: None,
        }
    }
}

pub struct Governor {
    provider: Arc<dyn GenerativeProvider>,
    cache: Arc<dyn ResultCache>,
    clock: Arc<dyn Clock>,
    pacer: Pacer,
    policy: GovernorPolicy,
}

impl Governor {
    pub fn new(
        provider: Arc<dyn GenerativeProvider>,
        cache: Arc<dyn ResultCache>,
        clock: Arc<dyn Clock>,
        policy: GovernorPolicy,
    ) -> Self {
        tracing::info!(
            provider = provider.name(),
            cache = cache.name(),
            daily_call_limit = ?policy.daily_call_limit,
            "Governor initialized"
        );

        Self {
            pacer: Pacer::new(clock.clone(), policy.daily_call_limit),
            provider,
            cache,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &GovernorPolicy {
        &self.policy
    }

    pub async fn snapshot(&self) -> BudgetSnapshot {
        self.pacer.snapshot().await
    }

    /// Five titles matched to the profile
    #[tracing::instrument(skip(self, profile), fields(content_type = %profile.content_type))]
    pub async fn request_recommendations(
        &self,
        profile: &RecommendationProfile,
    ) -> Outcome<Vec<Recommendation>> {
        let request = GenerationRequest::text(recommendations::build_prompt(profile));
        self.execute(
            CallSite::Recommendation,
            CacheKey::recommendation(profile),
            request,
            recommendations::parse_recommendations,
        )
        .await
    }

    /// Character name, or "Unknown" when the model does not recognize anyone
    #[tracing::instrument(skip(self, image_bytes), fields(bytes = image_bytes.len()))]
    pub async fn identify_from_image(&self, image_bytes: Vec<u8>) -> Outcome<String> {
        let key = CacheKey::vision(&image_bytes);
        let request = GenerationRequest::with_image(IDENTIFY_PROMPT, InlineImage::sniff(image_bytes));
        self.execute(CallSite::Vision, key, request, |text| {
            Ok(vision::parse_identified_name(text))
        })
        .await
    }

    /// AI write-up for a catalog character, cached per catalog id
    #[tracing::instrument(skip(self, biography))]
    pub async fn generate_profile_text(
        &self,
        subject_id: u64,
        name: &str,
        biography: Option<&str>,
    ) -> Outcome<String> {
        let request = GenerationRequest::text(profile::build_prompt(name, biography));
        self.execute(
            CallSite::Profile,
            CacheKey::profile(subject_id),
            request,
            profile::parse_profile_text,
        )
        .await
    }

    /// Cache lookup, then paced and retried provider calls, then cache write
    async fn execute<T, P>(
        &self,
        site: CallSite,
        key: CacheKey,
        request: GenerationRequest,
        parse: P,
    ) -> Outcome<T>
    where
        T: Serialize + DeserializeOwned,
        P: Fn(String) -> Result<T, ProviderFailure>,
    {
        if let Some(hit) = self.lookup(&key).await {
            return Outcome::Success(hit);
        }

        let policy = self.policy.for_site(site);
        let retrier = Retrier::new(
            &self.pacer,
            self.clock.as_ref(),
            &policy.retry,
            policy.min_interval,
            site.as_str(),
        );

        let provider = &self.provider;
        let parse = &parse;
        let outcome = retrier
            .run(move || {
                let request = request.clone();
                async move {
                    let text = provider.generate(request).await?.collect_text().await?;
                    parse(text)
                }
            })
            .await;

        if let Outcome::Success(value) = &outcome {
            self.store(&key, value, policy.ttl).await;
        }

        outcome
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(hit) => {
                    tracing::debug!(key = %key, "Cache hit");
                    Some(hit)
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache serialization error");
                return;
            }
        };

        if let Err(e) = self.cache.put(key, value, ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}
