pub mod error;
pub mod http_routes;
pub mod mock_gateway;
