//! HTTP front end. `POST /topdf` with an HTML document as the body answers
//! with the rendered PDF.
//!
//! Every request gets its own engine and session, the same as one run of
//! the command line tool writing to stdout.

use std::{io::Write, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use url::Url;

use crate::{
    engine::{EngineHandle, PageEngine},
    layout::Margins,
    request::{ConversionRequest, OutputTarget},
    session::{Failure, Outcome, Session},
};

pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Applied to every conversion the service runs.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub margins: Margins,
    pub time_limit: Option<Duration>,
}

struct Service<F> {
    new_engine: F,
    settings: ServiceSettings,
}

pub fn router<F, E>(new_engine: F, settings: ServiceSettings) -> Router
where
    F: Fn() -> E + Send + Sync + 'static,
    E: PageEngine,
{
    Router::new()
        .route("/topdf", post(to_pdf::<F, E>))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(Arc::new(Service {
            new_engine,
            settings,
        }))
}

pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("http server failed")
}

async fn to_pdf<F, E>(State(service): State<Arc<Service<F>>>, html: Bytes) -> Response
where
    F: Fn() -> E + Send + Sync + 'static,
    E: PageEngine,
{
    info!(len = html.len(), "conversion requested");
    let (outcome, pdf) = match convert(&service, &html).await {
        Ok(done) => done,
        Err(err) => {
            error!("{err:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")).into_response();
        }
    };

    let failure = match outcome {
        Outcome::Succeeded => {
            return (StatusCode::OK, [(header::CONTENT_TYPE, "application/pdf")], pdf)
                .into_response();
        }
        Outcome::Failed(failure) => failure,
    };
    let status = match failure {
        Failure::Load { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Failure::Print { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        Failure::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
    };
    warn!(%failure, "conversion failed");
    (status, failure.to_string()).into_response()
}

async fn convert<F, E>(service: &Service<F>, html: &[u8]) -> Result<(Outcome, Vec<u8>)>
where
    F: Fn() -> E + Send + Sync + 'static,
    E: PageEngine,
{
    let mut page = tempfile::Builder::new()
        .prefix("htmltopdf-")
        .suffix(".html")
        .tempfile()
        .context("cannot create a temporary page")?;
    page.write_all(html)
        .and_then(|()| page.flush())
        .context("cannot write the temporary page")?;
    let url = Url::from_file_path(page.path())
        .map_err(|_| anyhow!("no file URL for '{}'", page.path().display()))?;

    let request = ConversionRequest {
        input: page.path().display().to_string(),
        url,
        output: OutputTarget::Stdout,
        margins: service.settings.margins,
    };
    let engine = EngineHandle::spawn((service.new_engine)())
        .context("failed to start the page engine thread")?;

    let mut pdf = Vec::new();
    let outcome = Session::new(request, engine, &mut pdf)
        .run(service.settings.time_limit)
        .await;
    Ok((outcome, pdf))
}
