use ctk_core::config::{ArtifactFormat, CtkConfig, PropertyPolicy};
use ctk_core::ir::IrDocument;
use ctk_core::transform::{NormalizeOptions, ServiceFormat, normalize_service};
use ctk_core::{ArtifactGenerator, GeneratorError, parse, transform};
use ctk_mock::{MockConfigGenerator, MockDocument};
use serde_json::json;

const PAYMENTS: &str = include_str!("../../ctk-core/tests/fixtures/payments.yaml");
const PETSTORE_SWAGGER: &str = include_str!("../../ctk-core/tests/fixtures/petstore-swagger.yaml");
const ORDERS_WSDL: &str = include_str!("../../ctk-core/tests/fixtures/orders.wsdl");
const GREETER_PROTO: &str = include_str!("../../ctk-core/tests/fixtures/greeter.proto");

fn normalize(input: &str) -> IrDocument {
    transform::normalize(&parse::from_yaml(input).unwrap()).unwrap()
}

fn routes(doc: &MockDocument) -> Vec<(String, u16)> {
    doc.routes()
        .map(|r| (r.operation.clone(), r.response.status))
        .collect()
}

#[test]
fn one_route_per_declared_response() {
    let ir = normalize(PAYMENTS);
    let doc = MockConfigGenerator::build(&ir, &CtkConfig::default()).unwrap();

    assert_eq!(doc.servers.len(), 1);
    let server = &doc.servers[0];
    assert_eq!(server.protocol, "rest");
    assert_eq!(server.host, "0.0.0.0");
    assert_eq!(server.port, 8500);
    assert_eq!(server.name, "Payments API rest mock");

    // listPayments: `default` is dropped next to its 200.
    assert_eq!(
        routes(&doc),
        vec![
            ("listPayments".to_string(), 200),
            ("createPayment".to_string(), 201),
            ("createPayment".to_string(), 422),
            ("getPayment".to_string(), 200),
            ("getPayment".to_string(), 404),
            ("cancelPayment".to_string(), 204),
        ]
    );
}

#[test]
fn route_bodies_and_headers() {
    let ir = normalize(PAYMENTS);
    let doc = MockConfigGenerator::build(&ir, &CtkConfig::default()).unwrap();
    let routes: Vec<_> = doc.routes().collect();

    let get = routes[3];
    assert_eq!(get.matcher.method, "GET");
    assert_eq!(get.matcher.path, "/payments/{paymentId}");
    assert_eq!(get.response.latency_ms, 50);
    assert_eq!(
        get.response.headers.get("Content-Type").map(String::as_str),
        Some("application/json")
    );
    let body = get.response.body.as_ref().unwrap();
    assert_eq!(body["paymentId"], "{paymentId}");
    assert_eq!(body["status"], "pending");
    assert_eq!(get.description, "Mocked GET /payments/{paymentId} of Payments API");

    let not_found = routes[4];
    assert!(not_found.response.headers.is_empty());
    assert_eq!(not_found.response.body, None);

    let rejected = routes[2];
    assert_eq!(
        rejected.response.body,
        Some(json!({ "code": "string", "message": "string" }))
    );
}

#[test]
fn config_overrides() {
    let ir = normalize(PAYMENTS);
    let mut config = CtkConfig::default();
    config.mock.host = "127.0.0.1".to_string();
    config.mock.ports.insert("rest".to_string(), 9100);
    config.mock.latency_ms = 0;
    config.mock.description_template = "{{ operation }} -> {{ status }}".to_string();
    config.synthesis.response_properties = PropertyPolicy::RequiredOnly;

    let doc = MockConfigGenerator::build(&ir, &config).unwrap();
    let server = &doc.servers[0];
    assert_eq!(server.host, "127.0.0.1");
    assert_eq!(server.port, 9100);
    assert_eq!(doc.metadata["ports"], json!({ "rest": 9100 }));

    let get = doc.routes().nth(3).unwrap();
    assert_eq!(get.description, "getPayment -> 200");
    assert_eq!(get.response.latency_ms, 0);
    let body = get.response.body.as_ref().unwrap();
    assert!(body.get("description").is_none());
    assert_eq!(body["currency"], "EUR");
}

#[test]
fn generate_yaml_and_json() {
    let ir = normalize(PAYMENTS);
    let mut config = CtkConfig::default();

    let files = MockConfigGenerator.generate(&ir, &config).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "payments-api/1.4.0/mock-config.yaml");
    let from_yaml: MockDocument = serde_yaml_ng::from_str(&files[0].content).unwrap();

    config.mock.format = ArtifactFormat::Json;
    let files = MockConfigGenerator.generate(&ir, &config).unwrap();
    assert_eq!(files[0].path, "payments-api/1.4.0/mock-config.json");
    assert!(files[0].content.ends_with("}\n"));
    let from_json: MockDocument = serde_json::from_str(&files[0].content).unwrap();

    assert_eq!(from_yaml, from_json);
    assert_eq!(from_json.metadata["ir_metadata"]["title"], "Payments API");
}

#[test]
fn generation_is_deterministic() {
    let ir = normalize(PAYMENTS);
    let config = CtkConfig::default();
    let first = MockConfigGenerator.generate(&ir, &config).unwrap();
    let second = MockConfigGenerator.generate(&normalize(PAYMENTS), &config).unwrap();
    assert_eq!(first[0].content, second[0].content);
}

#[test]
fn bad_template_is_a_render_error() {
    let ir = normalize(PAYMENTS);
    let mut config = CtkConfig::default();
    config.mock.description_template = "{% if %}".to_string();
    assert!(matches!(
        MockConfigGenerator.generate(&ir, &config),
        Err(GeneratorError::Render(_))
    ));
}

#[test]
fn swagger_routes() {
    let ir = normalize(PETSTORE_SWAGGER);
    let doc = MockConfigGenerator::build(&ir, &CtkConfig::default()).unwrap();
    let find = doc
        .routes()
        .find(|r| r.operation == "findPetsByStatus" && r.response.status == 200)
        .unwrap();
    assert!(find.response.body.as_ref().unwrap().is_array());
}

#[test]
fn no_content_route() {
    let ir = normalize(PAYMENTS);
    let doc = MockConfigGenerator::build(&ir, &CtkConfig::default()).unwrap();
    let cancel = doc.routes().last().unwrap();
    insta::assert_json_snapshot!(cancel, @r#"
    {
      "operation": "cancelPayment",
      "description": "Mocked DELETE /payments/{paymentId} of Payments API",
      "matcher": {
        "method": "DELETE",
        "path": "/payments/{paymentId}"
      },
      "response": {
        "status": 204,
        "latency_ms": 50
      }
    }
    "#);
}

#[test]
fn soap_server_for_wsdl() {
    let ir = normalize_service(ORDERS_WSDL, ServiceFormat::Wsdl, &NormalizeOptions::default())
        .unwrap();
    let doc = MockConfigGenerator::build(&ir, &CtkConfig::default()).unwrap();
    let server = &doc.servers[0];
    assert_eq!(server.protocol, "soap");
    assert_eq!(server.port, 8600);
    assert_eq!(server.name, "OrderService soap mock");
    assert_eq!(doc.metadata["protocol_kind"], "soap");
    assert_eq!(doc.metadata["ports"], json!({ "soap": 8600 }));

    let place = &server.routes[0];
    assert_eq!(place.matcher.method, "POST");
    assert_eq!(place.matcher.path, "/soap/orders");
    assert_eq!(place.matcher.soap_action.as_deref(), Some("PlaceOrder"));
    assert_eq!(place.matcher.rpc_method, None);
    assert_eq!(place.response.status, 200);
    assert_eq!(place.response.body, None);
}

#[test]
fn rpc_server_for_proto() {
    let ir = normalize_service(GREETER_PROTO, ServiceFormat::Proto, &NormalizeOptions::default())
        .unwrap();
    let mut config = CtkConfig::default();
    config.mock.ports.insert("rpc".to_string(), 50051);
    let doc = MockConfigGenerator::build(&ir, &config).unwrap();
    assert_eq!(doc.servers[0].protocol, "rpc");
    assert_eq!(doc.servers[0].port, 50051);

    let hello = doc.routes().next().unwrap();
    insta::assert_json_snapshot!(hello.matcher, @r#"
    {
      "method": "POST",
      "path": "/helloworld.v1.Greeter/SayHello",
      "rpc_method": "SayHello"
    }
    "#);
}
