pub mod category_matcher;
pub mod email;
pub mod image_validator;
pub mod ingestion;
pub mod label_classifier;
pub mod notification_consumer;
pub mod notification_dispatcher;
pub mod subscription_service;

pub use email::{EmailSender, HttpEmailSender, LogEmailSender};
pub use ingestion::IngestionService;
pub use label_classifier::{DisabledClassifier, HttpLabelClassifier, LabelClassifier};
pub use notification_consumer::{NotificationConsumer, WorkerSettings};
pub use notification_dispatcher::NotificationDispatcher;
pub use subscription_service::SubscriptionService;
