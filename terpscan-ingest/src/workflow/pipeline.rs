//! Pipeline Orchestrator
//!
//! Runs one menu through every stage and reports progress as a stream.
//!
//! # Stages
//! 1. **Fetch**: read / download the menu (image or HTML)
//! 2. **Extract**: chunk tall images, run each band through the vision
//!    extractor (HTML goes through the text model instead)
//! 3. **Dedupe**: merge per-band lists, keep flower products only
//! 4. **Resolve**: windowed terpene resolution with per-strain progress
//! 5. **Score**: rank against the ideal profile when one is supplied
//!
//! # Error Handling
//! - Stages recover internally; only stage exhaustion reaches the stream
//! - No automatic retry at this level: the caller decides whether to rerun
//! - Zero flower products is `Error(NoFlowersFound)`, never an empty `Complete`
//!
//! # Cancellation
//! The stream is cold. Cancelling the token (or dropping the stream) drops
//! the in-flight stage future, which aborts its HTTP requests; no further
//! events are emitted.
//!
//! # Example
//! ```rust,ignore
//! let orchestrator = PipelineOrchestrator::from_config(&config, &api_key)?;
//! let mut events = Box::pin(orchestrator.run(source, None, CancellationToken::new()));
//! while let Some(status) = events.next().await { println!("{:?}", status); }
//! ```

use super::fetch::{fetch, FetchedMenu, MenuSource};
use super::{PipelineStatus, ResultMenu};
use crate::chunker;
use crate::error::{PipelineError, PipelineResult};
use crate::extractors::html_menu::html_to_menu_text;
use crate::extractors::{PromptConfig, VisionExtractor};
use crate::fusion;
use crate::llm::OpenAiCompatibleClient;
use crate::resolvers::{CannlyticsClient, ReferenceSet, TerpeneResolver};
use crate::scoring::{similarity_engine, UserProfile};
use crate::types::{ExtractionCandidate, ImageSegment, Strain, TextModel, VisionModel};
use async_stream::stream;
use futures::Stream;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use terpscan_common::config::{get_user_agent, ChunkingSettings, TomlConfig};
use terpscan_common::{Error, TerpeneProfile};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Menu download timeout
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingSettings,
    /// Character budget for stripped HTML menus
    pub html_max_chars: usize,
    /// Concurrent terpene resolutions per window
    pub concurrency_window: usize,
    pub prompt: PromptConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default())
    }
}

impl PipelineConfig {
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            chunking: config.chunking,
            html_max_chars: config.html.max_chars,
            concurrency_window: config.resolver.concurrency_window,
            prompt: PromptConfig::default(),
        }
    }
}

/// Outcome of one `select!` round while resolving
enum ResolveStep {
    Progress(usize, usize),
    Done(Vec<Strain>),
    Cancelled,
}

/// Pipeline orchestrator
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    extractor: Arc<VisionExtractor>,
    resolver: Arc<TerpeneResolver>,
    http_client: Client,
}

impl PipelineOrchestrator {
    /// Orchestrator over injected stages
    pub fn new(
        config: PipelineConfig,
        extractor: VisionExtractor,
        resolver: TerpeneResolver,
    ) -> terpscan_common::Result<Self> {
        let http_client = Client::builder()
            .user_agent(get_user_agent())
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            extractor: Arc::new(extractor),
            resolver: Arc::new(resolver),
            http_client,
        })
    }

    /// Orchestrator wired to the configured model provider and data sources
    pub fn from_config(config: &TomlConfig, api_key: &str) -> terpscan_common::Result<Self> {
        let vision: Arc<dyn VisionModel> =
            Arc::new(OpenAiCompatibleClient::vision(api_key, &config.models)?);
        let text: Arc<dyn TextModel> =
            Arc::new(OpenAiCompatibleClient::text(api_key, &config.models)?);

        let reference = match &config.resolver.reference_set_path {
            Some(path) => ReferenceSet::load(path)?,
            None => ReferenceSet::bundled()?,
        };
        info!(strains = reference.len(), "Reference set loaded");

        let mut resolver = TerpeneResolver::new(Arc::new(reference));
        if config.resolver.enable_chemical_lookup {
            let client = CannlyticsClient::new(
                &config.resolver.cannlytics_base_url,
                config.resolver.requests_per_second,
            )?;
            resolver = resolver.with_chemical_source(Arc::new(client));
        }
        if config.resolver.enable_model_estimate {
            resolver = resolver.with_estimator(Arc::clone(&text));
        }

        Self::new(
            PipelineConfig::from_toml(config),
            VisionExtractor::new(vision, text),
            resolver,
        )
    }

    pub fn resolver(&self) -> &TerpeneResolver {
        &self.resolver
    }

    /// Resolve liked strain names through the same chain and pool them
    pub async fn build_profile(&self, liked: &[String]) -> UserProfile {
        let candidates: Vec<ExtractionCandidate> =
            liked.iter().map(ExtractionCandidate::named).collect();
        let strains = self
            .resolver
            .resolve_all(&candidates, self.config.concurrency_window, |_, _| {})
            .await;

        for strain in strains.iter().filter(|s| s.terpenes.is_zero()) {
            warn!(strain = %strain.name, "Liked strain has no terpene data, ignored in profile");
        }
        UserProfile::from_liked(strains)
    }

    /// Run the pipeline over `source`
    ///
    /// Nothing happens until the stream is polled. The last event is
    /// `Complete` or `Error` unless the run is cancelled, in which case the
    /// stream just ends.
    pub fn run(
        &self,
        source: MenuSource,
        ideal: Option<TerpeneProfile>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = PipelineStatus> + Send + 'static {
        let this = self.clone();

        stream! {
            if cancel.is_cancelled() {
                return;
            }

            let run_id = Uuid::new_v4();
            let description = source.describe();
            info!(run_id = %run_id, source = %description, "Pipeline run started");
            yield PipelineStatus::Fetching { run_id, source: description.clone() };

            // Stage 1: fetch
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = fetch(&source, &this.http_client) => Some(result),
            };
            let fetched = match fetched {
                None => {
                    info!(run_id = %run_id, "Pipeline cancelled during fetch");
                    return;
                }
                Some(Err(e)) => {
                    error!(run_id = %run_id, error = %e, "Menu fetch failed");
                    yield PipelineStatus::from(&e);
                    return;
                }
                Some(Ok(fetched)) => fetched,
            };
            yield PipelineStatus::FetchComplete { size: fetched.size() };

            // Stage 2: extract
            let extracted = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = this.extract(fetched) => Some(result),
            };
            let lists = match extracted {
                None => {
                    info!(run_id = %run_id, "Pipeline cancelled during extraction");
                    return;
                }
                Some(Err(e)) => {
                    error!(run_id = %run_id, error = %e, "Menu extraction failed");
                    yield PipelineStatus::from(&e);
                    return;
                }
                Some(Ok(lists)) => lists,
            };

            // Stage 3: dedupe, keep flower
            let products = fusion::merge(lists);
            let total = products.len();
            let flowers: Vec<ExtractionCandidate> =
                products.into_iter().filter(ExtractionCandidate::is_flower).collect();
            info!(run_id = %run_id, total, flowers = flowers.len(), "Products found");
            yield PipelineStatus::ProductsFound { total, flower_count: flowers.len() };

            if flowers.is_empty() {
                let e = PipelineError::NoFlowersFound;
                warn!(run_id = %run_id, "Extraction found no flower products");
                yield PipelineStatus::from(&e);
                return;
            }

            // Stage 4: resolve
            let flower_total = flowers.len();
            yield PipelineStatus::ResolvingTerpenes { current: 0, total: flower_total };

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let resolving = this.resolver.resolve_all(
                &flowers,
                this.config.concurrency_window,
                move |done, total| {
                    let _ = progress_tx.send((done, total));
                },
            );
            tokio::pin!(resolving);

            let strains = loop {
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => ResolveStep::Cancelled,
                    Some((done, total)) = progress_rx.recv() => ResolveStep::Progress(done, total),
                    strains = &mut resolving => ResolveStep::Done(strains),
                };
                match step {
                    ResolveStep::Cancelled => {
                        info!(run_id = %run_id, "Pipeline cancelled during terpene resolution");
                        return;
                    }
                    ResolveStep::Progress(current, total) => {
                        yield PipelineStatus::ResolvingTerpenes { current, total };
                    }
                    ResolveStep::Done(strains) => {
                        while let Ok((current, total)) = progress_rx.try_recv() {
                            yield PipelineStatus::ResolvingTerpenes { current, total };
                        }
                        break strains;
                    }
                }
            };

            // Stage 5: score
            let ranked = ideal.and_then(|ideal| match similarity_engine::rank(&strains, &ideal) {
                Ok(ranked) => Some(ranked),
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Skipping ranking");
                    None
                }
            });

            info!(
                run_id = %run_id,
                strains = strains.len(),
                ranked = ranked.is_some(),
                "Pipeline run complete"
            );
            yield PipelineStatus::Complete {
                menu: ResultMenu {
                    run_id,
                    source: description,
                    generated_at: chrono::Utc::now(),
                    strains,
                    ranked,
                },
            };
        }
    }

    /// Image → bands → per-band lists; HTML → one list
    async fn extract(&self, fetched: FetchedMenu) -> PipelineResult<Vec<Vec<ExtractionCandidate>>> {
        match fetched {
            FetchedMenu::Image(bytes) => {
                let segments = self.segment(bytes).await;
                info!(segments = segments.len(), "Extracting menu image");
                self.extractor
                    .extract_segments(&segments, &self.config.prompt)
                    .await
            }
            FetchedMenu::Html(html) => {
                let text = html_to_menu_text(&html, self.config.html_max_chars);
                if text.trim().is_empty() {
                    return Err(PipelineError::NoFlowersFound);
                }
                info!(chars = text.chars().count(), "Extracting HTML menu");
                let extraction = self.extractor.extract_text(&text, &self.config.prompt).await?;
                Ok(vec![extraction.candidates])
            }
        }
    }

    /// Decode and band the image off the async runtime
    async fn segment(&self, bytes: Vec<u8>) -> Vec<ImageSegment> {
        let settings = self.config.chunking;
        let bytes = Arc::new(bytes);
        let for_task = Arc::clone(&bytes);

        match tokio::task::spawn_blocking(move || chunker::chunk(&for_task, &settings)).await {
            Ok(segments) => segments,
            Err(e) => {
                warn!(error = %e, "Chunking task failed, sending original image");
                vec![chunker::whole_image(&bytes, 0)]
            }
        }
    }
}
