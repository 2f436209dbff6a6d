mod events;
mod store;

pub use events::TodoEvents;
pub use store::TodoStore;

/// Composite trait covering the request/response operations and the push
/// channel.
///
/// Automatically implemented for any type that implements both sub-traits.
/// Use `Arc<dyn RemoteStore>` as the primary handle type.
pub trait RemoteStore: TodoStore + TodoEvents {}

impl<T> RemoteStore for T where T: TodoStore + TodoEvents {}
