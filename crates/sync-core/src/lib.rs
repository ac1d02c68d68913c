mod activator;
mod adjacency;
mod app;
mod bus;
mod config;
mod dom;
mod event_loop;
pub mod logging;
mod markup;
mod panel;
mod port;
mod realm;
mod registry;
mod surface;
mod widget;

pub use crate::activator::*;
pub use crate::adjacency::*;
pub use crate::app::*;
pub use crate::bus::*;
pub use crate::config::*;
pub use crate::dom::*;
pub use crate::event_loop::*;
pub use crate::markup::*;
pub use crate::panel::*;
pub use crate::port::*;
pub use crate::realm::*;
pub use crate::registry::*;
pub use crate::surface::*;
pub use crate::widget::*;
