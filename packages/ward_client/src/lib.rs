//! Ward Client Core
//!
//! Client-side protocol dispatch and state synchronization for the ward
//! clinic-messaging system. The [`dispatch::Dispatcher`] decodes nothing and
//! renders nothing: it takes decoded frames and operator actions, applies the
//! correct [`store::StateStore`] mutation, and emits [`render::RenderEvent`]
//! instructions for whatever front end is attached. Everything around it
//! (transport, REST collaborators, console) is replaceable glue.

pub mod api;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod render;
pub mod session;
pub mod store;
pub mod transport;
