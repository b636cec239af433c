//! Per-call request options

/// Extra headers, parameters, path suffix or payload added to one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query_params: Vec<(String, String)>,
    pub form_params: Vec<(String, String)>,
    pub path_suffix: Option<String>,
    pub payload: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn form_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_params.push((key.into(), value.into()));
        self
    }

    pub fn path_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.path_suffix = Some(suffix.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Paging helper shared by list calls: `marker` and `limit`.
    pub fn paginate(marker: Option<&str>, limit: Option<u32>) -> Self {
        let mut options = Self::new();
        if let Some(marker) = marker {
            options = options.query_param("marker", marker);
        }
        if let Some(limit) = limit {
            options = options.query_param("limit", limit.to_string());
        }
        options
    }
}
