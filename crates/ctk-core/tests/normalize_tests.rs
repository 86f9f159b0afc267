use ctk_core::error::{NormalizeError, TransformError};
use ctk_core::ir::{HttpMethod, IrDocument, IrParameterLocation, SchemaKind};
use ctk_core::parse;
use ctk_core::snapshot;
use ctk_core::transform::{self, NormalizeOptions};

const PAYMENTS: &str = include_str!("fixtures/payments.yaml");
const PETSTORE_SWAGGER: &str = include_str!("fixtures/petstore-swagger.yaml");
const RECURSIVE: &str = include_str!("fixtures/recursive.yaml");

fn normalize(input: &str) -> IrDocument {
    let doc = parse::from_yaml(input).unwrap();
    transform::normalize(&doc).unwrap()
}

#[test]
fn normalize_payments() {
    let ir = normalize(PAYMENTS);
    assert_eq!(ir.service, "Payments API");
    assert_eq!(ir.version, "1.4.0");
    assert_eq!(ir.protocol, "openapi");
    assert_eq!(ir.metadata["spec_version"], "3.0.3");

    let ids: Vec<&str> = ir.operations.iter().map(|op| op.operation_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["listPayments", "createPayment", "getPayment", "cancelPayment"]
    );

    let list = ir.operation("listPayments").unwrap();
    assert_eq!(list.method, HttpMethod::Get);
    assert_eq!(list.parameters.len(), 2);
    assert_eq!(list.parameters[1].name, "X-Trace-Id");
    assert_eq!(list.parameters[1].location, IrParameterLocation::Header);
    let statuses: Vec<&str> = list.responses.keys().map(String::as_str).collect();
    assert_eq!(statuses, vec!["200", "default"]);
    assert_eq!(
        list.responses["default"].description.as_deref(),
        Some("Error envelope")
    );

    let get = ir.operation("getPayment").unwrap();
    assert_eq!(get.parameters.len(), 1);
    assert!(get.parameters[0].required);
    assert_eq!(get.responses["404"].schema.root_node().unwrap().kind, SchemaKind::Unknown);
}

#[test]
fn normalize_merges_all_of() {
    let ir = normalize(PAYMENTS);
    let get = ir.operation("getPayment").unwrap();
    let tree = &get.responses["200"].schema;
    let SchemaKind::Object { properties, required } = &tree.root_node().unwrap().kind else {
        panic!("expected the merged payment object");
    };
    let names: Vec<&str> = properties.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec!["amount", "currency", "method", "description", "paymentId", "status", "createdAt"]
    );
    let required: Vec<&str> = required.iter().map(String::as_str).collect();
    assert_eq!(
        required,
        vec!["amount", "currency", "method", "paymentId", "status", "createdAt"]
    );

    let method = tree.node(properties["method"]).unwrap();
    let SchemaKind::OneOf { variants } = &method.kind else {
        panic!("expected payment method variants");
    };
    assert_eq!(variants.len(), 2);
    assert!(tree.node(properties["description"]).unwrap().nullable);
}

#[test]
fn normalize_records_unbound_path_parameter() {
    let ir = normalize(PAYMENTS);
    assert!(ir.operation("refundPayment").is_none());
    assert_eq!(ir.errors.len(), 1);

    let failure = &ir.errors[0];
    assert_eq!(failure.operation, "refundPayment");
    assert_eq!(failure.method, HttpMethod::Post);
    assert_eq!(
        failure.error,
        NormalizeError::UnboundPathParameter {
            path: "/payments/{paymentId}/refunds".to_string(),
            name: "paymentId".to_string(),
        }
    );
}

#[test]
fn normalize_is_idempotent() {
    let first = serde_json::to_string(&normalize(PAYMENTS)).unwrap();
    let second = serde_json::to_string(&normalize(PAYMENTS)).unwrap();
    assert_eq!(first, second);

    let first = serde_json::to_string(&normalize(RECURSIVE)).unwrap();
    let second = serde_json::to_string(&normalize(RECURSIVE)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn normalize_path_parameters_match_placeholders() {
    for input in [PAYMENTS, PETSTORE_SWAGGER, RECURSIVE] {
        let ir = normalize(input);
        for op in &ir.operations {
            let mut placeholders = op.path_placeholders();
            let mut declared = op.path_parameter_names();
            placeholders.sort_unstable();
            declared.sort_unstable();
            assert_eq!(placeholders, declared, "{} {}", op.method, op.path);
        }
    }
}

#[test]
fn normalize_recursive_schemas() {
    let ir = normalize(RECURSIVE);
    let ids: Vec<&str> = ir.operations.iter().map(|op| op.operation_id.as_str()).collect();
    assert_eq!(ids, vec!["getNode", "getNestedList"]);

    let node = &ir.operation("getNode").unwrap().responses["200"].schema;
    assert!(node.is_recursive());
    assert!(node.is_well_formed());
    assert_eq!(node.len(), 3);

    let list = &ir.operation("getNestedList").unwrap().responses["200"].schema;
    assert!(list.is_recursive());
    let SchemaKind::Array { items, .. } = &list.root_node().unwrap().kind else {
        panic!("expected array");
    };
    assert_eq!(*items, list.root);
}

#[test]
fn normalize_records_reference_failures() {
    let ir = normalize(RECURSIVE);
    assert_eq!(ir.errors.len(), 2);

    assert_eq!(ir.errors[0].operation, "getLoop");
    assert_eq!(
        ir.errors[0].error,
        NormalizeError::CyclicReference(
            "#/components/schemas/LoopA -> #/components/schemas/LoopB -> #/components/schemas/LoopA"
                .to_string()
        )
    );

    assert_eq!(ir.errors[1].operation, "getMissing");
    assert_eq!(
        ir.errors[1].error,
        NormalizeError::UnresolvedReference("#/components/schemas/Nope".to_string())
    );
}

#[test]
fn normalize_swagger_document() {
    let ir = normalize(PETSTORE_SWAGGER);
    assert_eq!(ir.protocol, "swagger");
    assert!(ir.errors.is_empty());
    assert_eq!(ir.operations.len(), 4);

    let add = ir.operation("addPet").unwrap();
    let body = add.request_body.as_ref().unwrap();
    assert_eq!(body.content_type, "application/json");
    assert!(body.required);
    assert!(add.parameters.is_empty());

    let find = ir.operation("findPetsByStatus").unwrap();
    let status = &find.parameters[0];
    assert_eq!(status.location, IrParameterLocation::Query);
    assert_eq!(status.schema.root_node().unwrap().kind.name(), "array");

    let form = ir.operation("updatePetWithForm").unwrap();
    assert_eq!(
        form.request_body.as_ref().unwrap().content_type,
        "application/x-www-form-urlencoded"
    );
    assert_eq!(form.parameters.len(), 1);
}

#[test]
fn normalize_duplicate_operation_ids() {
    let doc = parse::from_yaml(
        r#"
openapi: 3.0.0
info:
  title: Dupes
  version: '1'
paths:
  /a:
    get:
      operationId: fetch
      responses:
        '200':
          description: ok
  /b:
    get:
      operationId: fetch
      responses:
        '200':
          description: ok
"#,
    )
    .unwrap();
    let ir = transform::normalize(&doc).unwrap();
    assert_eq!(ir.operations.len(), 1);
    assert_eq!(ir.operations[0].path, "/a");
    assert_eq!(
        ir.errors[0].error,
        NormalizeError::DuplicateOperationId("fetch".to_string())
    );
}

#[test]
fn normalize_without_operations_is_fatal() {
    let doc = parse::from_yaml("openapi: 3.0.0\ninfo:\n  title: Empty\n  version: '1'\npaths: {}\n")
        .unwrap();
    let err = transform::normalize(&doc).unwrap_err();
    assert!(matches!(err, TransformError::NoOperations(service) if service == "Empty"));
}

#[test]
fn normalize_all_failed_is_fatal() {
    let doc = parse::from_yaml(
        r#"
openapi: 3.0.0
info:
  title: Broken
  version: '1'
paths:
  /items/{id}:
    get:
      responses:
        '200':
          description: ok
"#,
    )
    .unwrap();
    let err = transform::normalize(&doc).unwrap_err();
    let TransformError::AllOperationsFailed { service, errors } = err else {
        panic!("expected every operation to fail");
    };
    assert_eq!(service, "Broken");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].operation, "getItem");

    // A failed operation carries the same name it would have been given.
    let options = NormalizeOptions {
        aliases: [("getItem".to_string(), "fetchItem".to_string())]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    let err = transform::normalize_with_options(&doc, &options).unwrap_err();
    let TransformError::AllOperationsFailed { errors, .. } = err else {
        panic!("expected every operation to fail");
    };
    assert_eq!(errors[0].operation, "fetchItem");
}

#[test]
fn normalize_with_service_override_and_policy() {
    let doc = parse::from_yaml(PAYMENTS).unwrap();
    let options = NormalizeOptions {
        service_name: Some("payments".to_string()),
        source: Some("contracts/payments.yaml".to_string()),
        policy: Some(serde_json::json!({ "owner": "billing" })),
        ..Default::default()
    };
    let ir = transform::normalize_with_options(&doc, &options).unwrap();
    assert_eq!(ir.service, "payments");
    assert_eq!(ir.source.as_deref(), Some("contracts/payments.yaml"));
    assert_eq!(ir.metadata["policy"]["owner"], "billing");
}

#[test]
fn snapshot_round_trip() {
    let ir = normalize(PAYMENTS);
    let dir = tempfile::tempdir().unwrap();
    let path = snapshot::save(dir.path(), &ir).unwrap();
    assert!(path.ends_with("payments-api/1.4.0.json"));
    assert_eq!(snapshot::load(&path).unwrap(), ir);
}
