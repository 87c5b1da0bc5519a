use crate::{models::ReportedErrorEvent, CallOptions, ClientOptions, Error};
use std::fmt::Debug;

/// Client for the `ReportErrorsService` API.
pub trait ReportErrorsClient {
    /// Report an individual error event.
    ///
    /// `project_name` is the resource name of the project, see [`project_name`].
    fn report_error_event(
        &mut self,
        project_name: &str,
        event: &ReportedErrorEvent,
        options: &CallOptions,
    ) -> Result<(), Error>;

    /// Release the resources held by the client.
    fn close(&mut self);
}

/// Creates a fresh [`ReportErrorsClient`] for every report.
pub trait ClientFactory: Debug + Send + Sync {
    /// Client created by this factory.
    type Client: ReportErrorsClient;

    /// Create a client from the configured connection options.
    fn create(&self, options: &ClientOptions) -> Result<Self::Client, Error>;
}

/// Resource name of a project, `projects/{project_id}`.
pub fn project_name(project_id: &str) -> String {
    format!("projects/{}", project_id)
}

/// Closes the client exactly once, when dropped.
#[derive(Debug)]
pub(crate) struct ClientGuard<C: ReportErrorsClient>(C);

impl<C: ReportErrorsClient> ClientGuard<C> {
    pub(crate) fn new(client: C) -> Self {
        ClientGuard(client)
    }

    pub(crate) fn client(&mut self) -> &mut C {
        &mut self.0
    }
}

impl<C: ReportErrorsClient> Drop for ClientGuard<C> {
    fn drop(&mut self) {
        self.0.close();
    }
}
