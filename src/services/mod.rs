pub mod evidence;
pub mod live_gateway;
pub mod webhook;
pub mod worker;

pub use evidence::{Evidence, EvidenceResolver, EvidenceSource};
pub use live_gateway::{LiveGateway, LiveSubscription};
pub use webhook::HttpWebhookNotifier;
pub use worker::{run_consumer, spawn_workers, EnrichmentWorker, WorkerSettings};
