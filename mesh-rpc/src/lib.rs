//! Method registry, HTTPS RPC dispatch, and the uniform local/remote proxy
//! (spec.md §4.4).

mod http;
mod proxy;
mod registry;
mod state;

pub use http::{build_app, configure};
pub use proxy::{Proxy, ServiceProxy, Target};
pub use registry::{Handler, HandlerFuture, MethodRegistry};
pub use state::RpcState;
