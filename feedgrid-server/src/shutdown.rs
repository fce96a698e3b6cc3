/// An awaitable graceful-shutdown hook, implemented by [`CoreHandle`](crate::actor::CoreHandle)
/// so the process signal handler doesn't need to know the actor's internal command shape.
pub trait AsyncShutdown {
    type Result;
    fn shutdown(&self) -> impl std::future::Future<Output = Self::Result> + Send;
}
