/// Integration tests with a mocked Google Geocoding API
/// Tests the geocoding client without hitting the real service
use rust_datatico_api::errors::AppError;
use rust_datatico_api::services::{build_address, GeocodingService};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GEOCODE_PATH: &str = "/maps/api/geocode/json";

fn ok_response() -> serde_json::Value {
    serde_json::json!({
        "status": "OK",
        "results": [
            {
                "formatted_address": "Escazu, San Jose Province, Costa Rica",
                "geometry": { "location": { "lat": 9.9189, "lng": -84.1398 } }
            },
            {
                "formatted_address": "Escazu Centro, Costa Rica",
                "geometry": { "location": { "lat": 9.92, "lng": -84.14 } }
            }
        ]
    })
}

#[tokio::test]
async fn test_geocode_successful_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .and(query_param("address", "Escazu, San Jose, Costa Rica"))
        .and(query_param("region", "cr"))
        .and(query_param("key", "test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response()))
        .mount(&mock_server)
        .await;

    let service = GeocodingService::new(mock_server.uri(), "test_key".to_string());
    let location = service
        .geocode("Escazu, San Jose, Costa Rica")
        .await
        .expect("geocoding should succeed")
        .expect("a result should be returned");

    // First result wins
    assert_eq!(
        location.formatted_address,
        "Escazu, San Jose Province, Costa Rica"
    );
    assert!((location.lat - 9.9189).abs() < 1e-9);
    assert!((location.lng + 84.1398).abs() < 1e-9);
}

#[tokio::test]
async fn test_geocode_zero_results_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "ZERO_RESULTS", "results": []})),
        )
        .mount(&mock_server)
        .await;

    let service = GeocodingService::new(mock_server.uri(), "test_key".to_string());
    let result = service.geocode("Lugar inexistente, Costa Rica").await;
    assert!(matches!(result, Ok(None)));
}

#[tokio::test]
async fn test_geocode_request_denied_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        })))
        .mount(&mock_server)
        .await;

    let service = GeocodingService::new(mock_server.uri(), "bad_key".to_string());
    match service.geocode("San Jose, Costa Rica").await {
        Err(AppError::ExternalApiError(msg)) => {
            assert!(msg.contains("REQUEST_DENIED"));
            assert!(msg.contains("invalid"));
        }
        other => panic!("expected ExternalApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_geocode_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let service = GeocodingService::new(mock_server.uri(), "test_key".to_string());
    let result = service.geocode("Heredia, Costa Rica").await;
    assert!(matches!(result, Err(AppError::ExternalApiError(_))));
}

#[tokio::test]
async fn test_geocode_results_are_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = GeocodingService::new(mock_server.uri(), "test_key".to_string());
    let first = service.geocode("Escazu, Costa Rica").await.unwrap();
    // Same address with different case and padding hits the cache
    let second = service.geocode("  escazu, costa rica ").await.unwrap();
    assert_eq!(first, second);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_geocode_address_from_record() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .and(query_param("address", "Barrio Escalante, Carmen, San Jose, Costa Rica"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_response()))
        .mount(&mock_server)
        .await;

    let record = serde_json::json!({
        "cedula": "1-2345-6789",
        "direccion": "Barrio Escalante",
        "distrito": "Carmen",
        "provincia": "San Jose"
    });
    let address = build_address(&record).unwrap();

    let service = GeocodingService::new(mock_server.uri(), "test_key".to_string());
    assert!(service.geocode(&address).await.unwrap().is_some());
}
