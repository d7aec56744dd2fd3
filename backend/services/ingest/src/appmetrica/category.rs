use metrica_common::error::MetricaResult;
use metrica_db::analytics::models::TableRef;

/// How a field is coerced before it reaches ClickHouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    DateTime,
    Boolean,
}

/// A Logs API data set that is mirrored into its own ClickHouse table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataCategory {
    Installations,
    Events,
}

const INSTALLATION_FIELDS: &[&str] = &[
    "application_id",
    "installation_id",
    "attributed_touch_type",
    "click_datetime",
    "click_id",
    "click_ipv6",
    "click_timestamp",
    "click_url_parameters",
    "click_user_agent",
    "profile_id",
    "publisher_id",
    "publisher_name",
    "tracker_name",
    "tracking_id",
    "install_datetime",
    "install_ipv6",
    "install_receive_datetime",
    "install_receive_timestamp",
    "install_timestamp",
    "is_reattribution",
    "is_reinstallation",
    "match_type",
    "appmetrica_device_id",
    "city",
    "connection_type",
    "country_iso_code",
    "device_locale",
    "device_manufacturer",
    "device_model",
    "device_type",
    "google_aid",
    "oaid",
    "ios_ifa",
    "ios_ifv",
    "mcc",
    "mnc",
    "operator_name",
    "os_name",
    "os_version",
    "windows_aid",
    "app_package_name",
    "app_version_name",
];

const EVENT_FIELDS: &[&str] = &[
    "event_datetime",
    "event_json",
    "event_name",
    "event_receive_datetime",
    "event_receive_timestamp",
    "event_timestamp",
    "session_id",
    "installation_id",
    "appmetrica_device_id",
    "city",
    "connection_type",
    "country_iso_code",
    "device_ipv6",
    "device_locale",
    "device_manufacturer",
    "device_model",
    "device_type",
    "google_aid",
    "ios_ifa",
    "ios_ifv",
    "mcc",
    "mnc",
    "operator_name",
    "original_device_model",
    "os_name",
    "os_version",
    "profile_id",
    "windows_aid",
    "app_build_number",
    "app_package_name",
    "app_version_name",
    "application_id",
];

impl DataCategory {
    pub const ALL: [DataCategory; 2] = [DataCategory::Installations, DataCategory::Events];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Installations => "installations",
            Self::Events => "events",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Resolve configured names, keeping their order.
    /// Unknown or repeated names are rejected.
    pub fn parse_list(names: &[String]) -> Result<Vec<Self>, String> {
        let mut out: Vec<Self> = Vec::with_capacity(names.len());
        for name in names {
            let category = Self::from_name(name)
                .ok_or_else(|| format!("unknown data category {name:?}"))?;
            if out.contains(&category) {
                return Err(format!("data category {name:?} listed twice"));
            }
            out.push(category);
        }
        Ok(out)
    }

    /// Logs API export path, relative to the API base URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Installations => "/logs/v1/export/installations.json",
            Self::Events => "/logs/v1/export/events.json",
        }
    }

    /// Requested fields, in request (and insert) order.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Installations => INSTALLATION_FIELDS,
            Self::Events => EVENT_FIELDS,
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Installations => "appmetrica_installations",
            Self::Events => "appmetrica_events",
        }
    }

    pub fn table_ref(&self, database: &str) -> MetricaResult<TableRef> {
        TableRef::new(database, self.table_name())
    }

    /// Destination column the watermark is read from.
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            Self::Installations => "install_datetime",
            Self::Events => "event_datetime",
        }
    }

    pub fn application_column(&self) -> &'static str {
        "application_id"
    }

    pub fn field_kind(&self, field: &str) -> FieldKind {
        match (self, field) {
            (_, "application_id" | "mcc" | "mnc") => FieldKind::Integer,
            (
                Self::Installations,
                "click_timestamp"
                | "install_receive_timestamp"
                | "install_timestamp"
                | "publisher_id"
                | "tracking_id",
            ) => FieldKind::Integer,
            (
                Self::Installations,
                "click_datetime" | "install_datetime" | "install_receive_datetime",
            ) => FieldKind::DateTime,
            (Self::Installations, "is_reattribution" | "is_reinstallation") => FieldKind::Boolean,
            (
                Self::Events,
                "event_receive_timestamp" | "event_timestamp" | "session_id" | "app_build_number",
            ) => FieldKind::Integer,
            (Self::Events, "event_datetime" | "event_receive_datetime") => FieldKind::DateTime,
            _ => FieldKind::String,
        }
    }
}

impl std::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
