//! Batch slice/transcribe worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vbatch_analysis::{DashScopeClient, TranscriptionConfig, VideoIntelligenceClient, VideoIntelligenceConfig};
use vbatch_media::{check_ffmpeg, check_ffprobe, FfmpegAudioExtractor, FfmpegEncoder, FfprobeDurationProbe};
use vbatch_models::Pipeline;
use vbatch_storage::{GcsStager, GcsStagingConfig, ObjectStager, S3Stager, TokenCache};
use vbatch_worker::metrics::init_metrics;
use vbatch_worker::{
    BatchOrchestrator, ItemPipeline, SlicePipeline, TermCorrector, TranscribePipeline, WorkerConfig,
};

const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();

    init_tracing();

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => match init_metrics(addr) {
                Ok(()) => info!("Metrics exporter listening on {}", addr),
                Err(e) => warn!("Failed to start metrics exporter: {}", e),
            },
            Err(e) => warn!("Ignoring invalid METRICS_ADDR '{}': {}", addr, e),
        }
    }

    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    info!(
        pipeline = %config.pipeline,
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        max_concurrent = config.max_concurrent,
        worker_count = config.worker_count,
        "Starting vbatch; up to {} encoder processes may run at once",
        config.max_processes()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline = match build_pipeline(&config, shutdown_rx.clone()) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to initialize {} pipeline: {:#}", config.pipeline, e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, no new items will start");
            let _ = shutdown_tx.send(true);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Received second shutdown signal, exiting without a final report");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });

    let orchestrator = BatchOrchestrator::new(&config, pipeline).with_shutdown(shutdown_rx.clone());

    match orchestrator.run().await {
        Ok(report) => {
            info!(
                succeeded = report.succeeded,
                quality_rejected = report.quality_rejected,
                failed = report.failed,
                interrupted = report.interrupted,
                "Report written to {}",
                config.report_path().display()
            );
        }
        Err(e) => {
            error!("Batch failed: {}", e);
            let code = if *shutdown_rx.borrow() {
                EXIT_INTERRUPTED
            } else {
                EXIT_FAILURE
            };
            std::process::exit(code);
        }
    }
}

/// JSON logs when `LOG_FORMAT=json`, coloured text otherwise.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "vbatch=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Wire the concrete clients for the configured pipeline.
fn build_pipeline(config: &WorkerConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<Arc<dyn ItemPipeline>> {
    let ffmpeg = check_ffmpeg().context("ffmpeg is required")?;
    info!("Using ffmpeg at {}", ffmpeg.display());

    match config.pipeline {
        Pipeline::Slice => {
            let ffprobe = check_ffprobe().context("ffprobe is required")?;
            info!("Using ffprobe at {}", ffprobe.display());

            let tokens = Arc::new(TokenCache::from_env()?);
            let stager: Arc<dyn ObjectStager> = Arc::new(GcsStager::new(GcsStagingConfig::from_env(), tokens.clone())?);
            let analysis = VideoIntelligenceClient::new(VideoIntelligenceConfig::from_env(), tokens, Some(stager))?;

            let pipeline = SlicePipeline::new(
                config,
                Arc::new(analysis),
                Arc::new(FfmpegEncoder::new(config.encoding.clone())),
                Arc::new(FfprobeDurationProbe::new()),
            )
            .with_cancel(shutdown);
            Ok(Arc::new(pipeline))
        }
        Pipeline::Transcribe => {
            let stager = Arc::new(S3Stager::from_env()?);
            let analysis = DashScopeClient::new(TranscriptionConfig::from_env()?, stager)?;

            let pipeline = TranscribePipeline::new(config, Arc::new(analysis), Arc::new(FfmpegAudioExtractor::new()));
            let pipeline = match TermCorrector::from_config(config)? {
                Some(corrector) => {
                    info!(terms = config.professional_terms.len(), "Professional term correction enabled");
                    pipeline.with_term_corrector(corrector)
                }
                None => pipeline,
            };
            Ok(Arc::new(pipeline))
        }
    }
}
