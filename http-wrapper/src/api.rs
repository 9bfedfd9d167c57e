//! Hub endpoints.
//!
//! Service credentials (no `DeviceId`) get a [`Registry`] for managing device
//! records; device credentials get a [`DeviceEndpoint`] for messaging. Both
//! borrow the [`ServiceClient`] and its connection pool.

use reqwest::Method;

use iothub_data_formats::device::DeviceIdentity;

use crate::client::{Error, HubResponse, RequestResult, ServiceClient};

impl ServiceClient {
    /// Builds `host/path?[query&]api-version=V`.
    pub fn endpoint(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}?", self.credentials().host_name(), path);
        if let Some(query) = query {
            url.push_str(query);
            url.push('&');
        }
        url.push_str("api-version=");
        url.push_str(&self.config().api_version);
        url
    }

    pub fn registry(&self) -> RequestResult<Registry<'_>> {
        if self.is_device() {
            return Err(Error::WrongScope {
                operation: "device registry",
                scope: "device",
            });
        }
        Ok(Registry { client: self })
    }

    pub fn device(&self) -> RequestResult<DeviceEndpoint<'_>> {
        match self.credentials().device_id() {
            Some(device_id) => Ok(DeviceEndpoint {
                client: self,
                device_id,
            }),
            None => Err(Error::WrongScope {
                operation: "device messaging",
                scope: "service",
            }),
        }
    }
}

/// Device record management.
#[derive(Debug, Clone, Copy)]
pub struct Registry<'a> {
    client: &'a ServiceClient,
}

impl Registry<'_> {
    fn device_url(&self, device_id: &str) -> String {
        self.client.endpoint(&format!("devices/{}", device_id), None)
    }

    /// Creates (or overwrites) the record for `device_id`.
    pub fn create_device(&self, device_id: &str) -> RequestResult<HubResponse> {
        let body = DeviceIdentity { device_id }.to_json()?;
        self.client
            .perform(Method::PUT, &self.device_url(device_id), &body)
    }

    pub fn get_device(&self, device_id: &str) -> RequestResult<HubResponse> {
        self.client
            .perform(Method::GET, &self.device_url(device_id), "")
    }

    /// Deletes the record regardless of its current etag.
    pub fn delete_device(&self, device_id: &str) -> RequestResult<HubResponse> {
        self.client
            .perform(Method::DELETE, &self.device_url(device_id), "")
    }

    /// Drops any cloud-to-device commands still queued for `device_id`.
    pub fn purge_commands(&self, device_id: &str) -> RequestResult<HubResponse> {
        let url = self
            .client
            .endpoint(&format!("devices/{}/commands", device_id), None);
        self.client.perform(Method::DELETE, &url, "")
    }

    pub fn list_devices(&self, top: usize) -> RequestResult<HubResponse> {
        let url = self
            .client
            .endpoint("devices", Some(&format!("top={}", top)));
        self.client.perform(Method::GET, &url, "")
    }
}

/// Messaging for the device named in the connection string.
#[derive(Debug, Clone, Copy)]
pub struct DeviceEndpoint<'a> {
    client: &'a ServiceClient,
    device_id: &'a str,
}

impl DeviceEndpoint<'_> {
    pub fn device_id(&self) -> &str {
        self.device_id
    }

    /// Sends a device-to-cloud message; the payload goes out as-is.
    pub fn send_message(&self, payload: &str) -> RequestResult<HubResponse> {
        let url = self.client.endpoint(
            &format!("devices/{}/messages/events", self.device_id),
            None,
        );
        self.client.perform(Method::POST, &url, payload)
    }

    /// Polls for the next cloud-to-device message.
    pub fn receive_message(&self) -> RequestResult<HubResponse> {
        let url = self.client.endpoint(
            &format!("devices/{}/messages/deviceBound", self.device_id),
            None,
        );
        self.client.perform(Method::GET, &url, "")
    }
}

#[cfg(test)]
mod test {
    use crate::client::{ClientConfig, Error, ServiceClient};

    const SERVICE: &str =
        "HostName=hub.example.net;SharedAccessKeyName=iothubowner;SharedAccessKey=c2VjcmV0";
    const DEVICE: &str = "HostName=hub.example.net;DeviceId=dev1;SharedAccessKey=c2VjcmV0";

    #[test]
    fn test_endpoint() {
        let client =
            ServiceClient::from_connection_string(SERVICE, ClientConfig::default()).unwrap();

        assert_eq!(
            client.endpoint("devices/foo", None),
            "hub.example.net/devices/foo?api-version=2016-11-14"
        );
        assert_eq!(
            client.endpoint("devices", Some("top=10")),
            "hub.example.net/devices?top=10&api-version=2016-11-14"
        );

        let config = ClientConfig {
            api_version: "2021-04-12".to_string(),
            ..Default::default()
        };
        let client = ServiceClient::from_connection_string(SERVICE, config).unwrap();
        assert_eq!(
            client.endpoint("devices/foo/commands", None),
            "hub.example.net/devices/foo/commands?api-version=2021-04-12"
        );
    }

    #[test]
    fn test_scopes() {
        let service =
            ServiceClient::from_connection_string(SERVICE, ClientConfig::default()).unwrap();
        assert!(service.registry().is_ok());
        assert!(matches!(
            service.device(),
            Err(Error::WrongScope {
                scope: "service",
                ..
            })
        ));

        let device =
            ServiceClient::from_connection_string(DEVICE, ClientConfig::default()).unwrap();
        assert_eq!(device.device().unwrap().device_id(), "dev1");
        assert!(matches!(
            device.registry(),
            Err(Error::WrongScope { scope: "device", .. })
        ));
    }
}
