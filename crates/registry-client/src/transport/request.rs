//! Request shaping shared by every wire adapter
//!
//! One function per registry operation, each producing a [`RegistryRequest`]
//! with the method, path relative to the service URL, query parameters and
//! body. Adapters only have to put it on the wire.

use crate::models::{InstanceInfo, InstanceStatus};

/// HTTP method of a registry request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// A registry request before it is bound to an endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the service URL, without a leading `/`
    pub path: String,
    /// Query parameters in order
    pub query: Vec<(&'static str, String)>,
    /// Instance to send as the body
    pub body: Option<InstanceInfo>,
}

impl RegistryRequest {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    fn regions(self, regions: &[String]) -> Self {
        match regions_param(regions) {
            Some(value) => self.param("regions", value),
            None => self,
        }
    }

    /// Absolute URL under `service_url`, without the query string
    pub fn url(&self, service_url: &str) -> String {
        format!("{}/{}", service_url.trim_end_matches('/'), self.path)
    }
}

/// Comma-joined `regions` parameter, absent when there are no regions
pub fn regions_param(regions: &[String]) -> Option<String> {
    if regions.is_empty() {
        None
    } else {
        Some(regions.join(","))
    }
}

/// `POST apps/{app}` with the instance as body
pub fn register(info: &InstanceInfo) -> RegistryRequest {
    let mut request = RegistryRequest::new(Method::Post, format!("apps/{}", info.app_name));
    request.body = Some(info.clone());
    request
}

/// `DELETE apps/{app}/{id}`
pub fn cancel(app_name: &str, id: &str) -> RegistryRequest {
    RegistryRequest::new(Method::Delete, format!("apps/{}/{}", app_name, id))
}

/// `PUT apps/{app}/{id}?status=..&lastDirtyTimestamp=..[&overriddenstatus=..]`
pub fn heartbeat(
    app_name: &str,
    id: &str,
    info: &InstanceInfo,
    overridden_status: Option<InstanceStatus>,
) -> RegistryRequest {
    let request = RegistryRequest::new(Method::Put, format!("apps/{}/{}", app_name, id))
        .param("status", info.status.as_str())
        .param("lastDirtyTimestamp", info.last_dirty_timestamp.to_string());
    match overridden_status {
        Some(status) => request.param("overriddenstatus", status.as_str()),
        None => request,
    }
}

/// `PUT apps/{app}/{id}/status?value=..&lastDirtyTimestamp=..`
pub fn update_status(
    app_name: &str,
    id: &str,
    new_status: InstanceStatus,
    info: &InstanceInfo,
) -> RegistryRequest {
    RegistryRequest::new(Method::Put, format!("apps/{}/{}/status", app_name, id))
        .param("value", new_status.as_str())
        .param("lastDirtyTimestamp", info.last_dirty_timestamp.to_string())
}

/// `DELETE apps/{app}/{id}/status?lastDirtyTimestamp=..`
pub fn clear_status_override(app_name: &str, id: &str, info: &InstanceInfo) -> RegistryRequest {
    RegistryRequest::new(Method::Delete, format!("apps/{}/{}/status", app_name, id))
        .param("lastDirtyTimestamp", info.last_dirty_timestamp.to_string())
}

/// `GET apps/[?regions=..]`
pub fn fetch_all(regions: &[String]) -> RegistryRequest {
    RegistryRequest::new(Method::Get, "apps/".to_string()).regions(regions)
}

/// `GET apps/delta[?regions=..]`
pub fn fetch_delta(regions: &[String]) -> RegistryRequest {
    RegistryRequest::new(Method::Get, "apps/delta".to_string()).regions(regions)
}

/// `GET vips/{vip}[?regions=..]`
pub fn fetch_by_vip(vip: &str, regions: &[String]) -> RegistryRequest {
    RegistryRequest::new(Method::Get, format!("vips/{}", vip)).regions(regions)
}

/// `GET svips/{vip}[?regions=..]`
pub fn fetch_by_secure_vip(vip: &str, regions: &[String]) -> RegistryRequest {
    RegistryRequest::new(Method::Get, format!("svips/{}", vip)).regions(regions)
}

/// `GET apps/{app}`
pub fn fetch_application(app_name: &str) -> RegistryRequest {
    RegistryRequest::new(Method::Get, format!("apps/{}", app_name))
}

/// `GET apps/{app}/{id}`
pub fn fetch_instance(app_name: &str, id: &str) -> RegistryRequest {
    RegistryRequest::new(Method::Get, format!("apps/{}/{}", app_name, id))
}

/// `GET instances/{id}`
pub fn fetch_instance_by_id(id: &str) -> RegistryRequest {
    RegistryRequest::new(Method::Get, format!("instances/{}", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> InstanceInfo {
        let mut info = InstanceInfo::new("orders", "orders-1", "host-a", 8080);
        info.last_dirty_timestamp = 1234;
        info
    }

    #[test]
    fn test_paths() {
        let info = instance();
        assert_eq!(register(&info).path, "apps/ORDERS");
        assert_eq!(register(&info).method, Method::Post);
        assert_eq!(cancel("ORDERS", "orders-1").path, "apps/ORDERS/orders-1");
        assert_eq!(
            update_status("ORDERS", "orders-1", InstanceStatus::Down, &info).path,
            "apps/ORDERS/orders-1/status"
        );
        assert_eq!(fetch_all(&[]).path, "apps/");
        assert_eq!(fetch_delta(&[]).path, "apps/delta");
        assert_eq!(fetch_by_vip("orders", &[]).path, "vips/orders");
        assert_eq!(fetch_by_secure_vip("orders", &[]).path, "svips/orders");
        assert_eq!(fetch_application("ORDERS").path, "apps/ORDERS");
        assert_eq!(fetch_instance("ORDERS", "o-1").path, "apps/ORDERS/o-1");
        assert_eq!(fetch_instance_by_id("o-1").path, "instances/o-1");
    }

    #[test]
    fn test_heartbeat_query() {
        let info = instance();
        let plain = heartbeat("ORDERS", "orders-1", &info, None);
        assert_eq!(plain.method, Method::Put);
        assert_eq!(
            plain.query,
            vec![
                ("status", "UP".to_string()),
                ("lastDirtyTimestamp", "1234".to_string())
            ]
        );

        let overridden = heartbeat("ORDERS", "orders-1", &info, Some(InstanceStatus::OutOfService));
        assert_eq!(
            overridden.query.last(),
            Some(&("overriddenstatus", "OUT_OF_SERVICE".to_string()))
        );
    }

    #[test]
    fn test_status_queries() {
        let info = instance();
        let update = update_status("ORDERS", "orders-1", InstanceStatus::OutOfService, &info);
        assert_eq!(
            update.query,
            vec![
                ("value", "OUT_OF_SERVICE".to_string()),
                ("lastDirtyTimestamp", "1234".to_string())
            ]
        );

        let clear = clear_status_override("ORDERS", "orders-1", &info);
        assert_eq!(clear.method, Method::Delete);
        assert_eq!(clear.query, vec![("lastDirtyTimestamp", "1234".to_string())]);
    }

    #[test]
    fn test_regions_joined() {
        let regions = vec!["us-west-2".to_string(), "eu-west-1".to_string()];
        let request = fetch_all(&regions);
        assert_eq!(
            request.query,
            vec![("regions", "us-west-2,eu-west-1".to_string())]
        );
        assert!(fetch_delta(&[]).query.is_empty());
        assert_eq!(regions_param(&[]), None);
    }

    #[test]
    fn test_url_joining() {
        let request = fetch_application("ORDERS");
        assert_eq!(
            request.url("http://registry:8761/eureka/"),
            "http://registry:8761/eureka/apps/ORDERS"
        );
        assert_eq!(
            request.url("http://registry:8761"),
            "http://registry:8761/apps/ORDERS"
        );
    }
}
