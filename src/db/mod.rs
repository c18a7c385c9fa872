pub mod categories;
pub mod items;
pub mod pool;
pub mod queue;
pub mod subscriptions;

pub use categories::{CategoryRepository, PgCategoryRepository};
pub use items::{ItemRepository, PgItemRepository};
pub use pool::{create_pool, run_migrations};
pub use queue::{NotificationQueue, PgNotificationQueue};
pub use subscriptions::{PgSubscriptionRepository, SubscriptionRepository};
