pub mod ids;
pub mod node;
pub mod registry;
pub mod request;
pub mod ui;

pub use ids::generate_ui_id;
pub use node::{NodeInfo, NodeSession};
pub use registry::SessionRegistry;
pub use request::{Request, RequestParams, ResponseError, ResponseFrame};
pub use ui::UISession;
