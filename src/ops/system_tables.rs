//! Monitoring queries: system tables, slow events and license install

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One entry of `GET /system-tables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemTable {
    pub table_name: String,
    pub schema: String,
}

#[derive(Debug, Deserialize)]
struct SystemTableListResponse {
    system_table_list: Vec<SystemTable>,
}

/// One data-collector slow event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowEvent {
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub event_description: String,
    #[serde(default)]
    pub phases_duration_description: String,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Deserialize)]
struct SlowEventsResponse {
    #[serde(default)]
    slow_events: Vec<SlowEvent>,
}

/// `GET /system-tables` from the first answering host.
pub struct GetSystemTablesOp {
    base: OpBase,
}

impl GetSystemTablesOp {
    pub fn new(up_hosts: Vec<String>) -> Self {
        GetSystemTablesOp {
            base: OpBase::with_hosts("get_system_tables", up_hosts),
        }
    }
}

#[async_trait]
impl ClusterOp for GetSystemTablesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "list system tables".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_get("system-tables"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("get_system_tables", &results)?;
        let response: SystemTableListResponse = passing.json()?;
        ctx.system_table_list = response.system_table_list;
        Ok(())
    }
}

/// Filters for the slow-events query.
#[derive(Debug, Clone, Default)]
pub struct SlowEventFilters {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub thread_id: Option<String>,
    pub phases_duration_desc: Option<String>,
    pub event_desc: Option<String>,
    pub node_name: Option<String>,
}

/// `GET /dc/slow-events` from the first answering host.
pub struct GetSlowEventsOp {
    base: OpBase,
    filters: SlowEventFilters,
}

impl GetSlowEventsOp {
    pub fn new(up_hosts: Vec<String>, filters: SlowEventFilters) -> Self {
        GetSlowEventsOp {
            base: OpBase::with_hosts("get_slow_events", up_hosts),
            filters,
        }
    }
}

#[async_trait]
impl ClusterOp for GetSlowEventsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "collect slow events from the data collector".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let filters = self.filters.clone();
        self.base.register_for_all(move |_| {
            let mut request = HostRequest::https_get("dc/slow-events");
            let pairs = [
                ("start-time", &filters.start_time),
                ("end-time", &filters.end_time),
                ("thread-id", &filters.thread_id),
                ("phases-duration-desc", &filters.phases_duration_desc),
                ("event-desc", &filters.event_desc),
                ("node-name", &filters.node_name),
            ];
            for (key, value) in pairs {
                if let Some(value) = value {
                    request = request.with_query(key, value.clone());
                }
            }
            request
        });
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("get_slow_events", &results)?;
        let response: SlowEventsResponse = passing.json()?;
        ctx.slow_events = response.slow_events;
        Ok(())
    }
}

/// `PUT /license?licenseFile=…` on one initiator.
pub struct InstallLicenseOp {
    base: OpBase,
    license_file: String,
}

impl InstallLicenseOp {
    pub fn new(initiators: Vec<String>, license_file: impl Into<String>) -> Self {
        InstallLicenseOp {
            base: OpBase::with_hosts("install_license", initiators),
            license_file: license_file.into(),
        }
    }
}

#[async_trait]
impl ClusterOp for InstallLicenseOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("install license {}", self.license_file)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let license_file = self.license_file.clone();
        self.base.register_for_all(move |_| {
            HostRequest::https_put("license", serde_json::json!({}))
                .with_query("licenseFile", license_file.clone())
        });
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("install_license", &results)?;
        Ok(())
    }
}
