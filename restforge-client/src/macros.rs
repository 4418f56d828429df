//! Typed endpoint wrappers.

/// Generate a typed SDK struct from a route table.
///
/// Each entry reads `method_name => "endpointName": "METHOD /path"`. The
/// generated `new` registers every route on the client; each method invokes
/// its endpoint by name.
///
/// ```rust,no_run
/// use restforge_client::{SdkClient, SdkConfig, sdk_endpoints};
/// use serde_json::json;
///
/// sdk_endpoints! {
///     /// Users API.
///     pub struct UsersApi {
///         get_user => "getUser": "GET /users/{id}",
///         create_user => "createUser": "POST /users",
///     }
/// }
///
/// # async fn demo() -> restforge_client::Result<()> {
/// let client = SdkClient::new(SdkConfig::builder("https://api.example.com").build()?)?;
/// let api = UsersApi::new(client)?;
/// api.create_user(json!({"name": "Ann"}), None).await?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! sdk_endpoints {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($method:ident => $endpoint:literal : $route:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            client: $crate::SdkClient,
        }

        impl $name {
            /// Register the routes on `client` and wrap it.
            $vis fn new(client: $crate::SdkClient) -> $crate::Result<Self> {
                $(client.register_route($endpoint, $route)?;)*
                Ok(Self { client })
            }

            /// The wrapped client.
            $vis fn client(&self) -> &$crate::SdkClient {
                &self.client
            }

            $(
                #[doc = concat!("Invoke `", $endpoint, "` (`", $route, "`).")]
                $vis async fn $method(
                    &self,
                    body: impl Into<$crate::Payload>,
                    extra_params: Option<$crate::Params>,
                ) -> $crate::Result<$crate::ResponseData> {
                    self.client.invoke($endpoint, body, extra_params).await
                }
            )*
        }
    };
}
