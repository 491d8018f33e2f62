use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use schoolerp_core::TenantId;
use schoolerp_infra::config::AppConfig;
use schoolerp_infra::external::InMemoryMailTransport;

struct TestServer {
    base_url: String,
    outbox: Arc<InMemoryMailTransport>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, default config, outbox transport, ephemeral port.
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let outbox = Arc::new(InMemoryMailTransport::new());
        let services = schoolerp_api::app::services::build_services(&config, outbox.clone());
        let app = schoolerp_api::app::build_app(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            outbox,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Tenant<'a> {
    srv: &'a TestServer,
    client: reqwest::Client,
    tenant_id: TenantId,
}

impl<'a> Tenant<'a> {
    fn new(srv: &'a TestServer) -> Self {
        Self {
            srv,
            client: reqwest::Client::new(),
            tenant_id: TenantId::new(),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let res = req
            .header("x-tenant-id", self.tenant_id.to_string())
            .send()
            .await
            .unwrap();
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.srv.url(path))).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.srv.url(path)).json(&body)).await
    }

    async fn patch(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.patch(self.srv.url(path)).json(&body)).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.put(self.srv.url(path)).json(&body)).await
    }

    async fn student(&self, name: &str, email: &str) -> String {
        let (status, body) = self
            .post("/students", json!({ "name": name, "contact_email": email }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn published_template(&self, name: &str, amounts: &[u64]) -> String {
        let items: Vec<Value> = amounts
            .iter()
            .map(|a| json!({ "description": format!("{name} fee"), "amount": a }))
            .collect();
        let (status, body) = self
            .post("/templates", json!({ "name": name, "items": items }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = self.post(&format!("/templates/{id}/publish"), json!({})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["state"], "published");
        id
    }
}

#[tokio::test]
async fn health_is_public_and_scoped_routes_need_a_tenant() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/invoices")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/invoices"))
        .header("x-tenant-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn batch_creation_emails_each_student() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);
    let ada = t.student("Ada", "ada@parents.example").await;
    let bob = t.student("Bob", "bob@parents.example").await;
    let term = t.published_template("Term 1", &[40_000, 2_500]).await;

    let (status, body) = t
        .post(
            "/invoices",
            json!({
                "student_ids": [ada, bob],
                "template_id": term,
                "date": "2024-09-01",
                "due_date": "2024-09-30",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    for (item, (student, name)) in items.iter().zip([(&ada, "Ada"), (&bob, "Bob")]) {
        assert_eq!(item["status"], "created");
        assert_eq!(item["email"]["status"], "sent");
        let invoice = &item["invoice"];
        assert_eq!(invoice["student_id"], student.as_str());
        assert_eq!(invoice["amount"], 42_500);
        assert_eq!(invoice["due_date"], "2024-09-30");
        assert_eq!(invoice["combination"], format!("{name}-Term 1"));
    }
    assert_eq!(items[0]["invoice"]["invoice_number"], "INV/00001");
    assert_eq!(items[1]["invoice"]["invoice_number"], "INV/00002");
    assert_eq!(srv.outbox.outbox().len(), 2);

    let id = items[0]["invoice"]["id"].as_str().unwrap();
    let (status, body) = t.get(&format!("/invoices/{id}/attachments")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["name"], "Invoice.pdf");
    assert_eq!(body["items"][0]["content_type"], "application/pdf");
}

#[tokio::test]
async fn no_email_flag_suppresses_delivery() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);
    let ada = t.student("Ada", "ada@parents.example").await;
    let term = t.published_template("Term 1", &[1_000]).await;

    let (status, body) = t
        .post(
            "/invoices?no_email=true",
            json!({ "student_ids": [ada], "template_id": term, "due_date": "2999-01-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["items"][0]["email"]["status"], "suppressed");
    assert!(srv.outbox.outbox().is_empty());

    let id = body["items"][0]["invoice"]["id"].as_str().unwrap();
    let (status, body) = t.post(&format!("/invoices/{id}/send"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["recipient"], "ada@parents.example");
    assert_eq!(srv.outbox.outbox().len(), 1);
}

#[tokio::test]
async fn date_order_is_enforced_on_create_and_update() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);
    let ada = t.student("Ada", "ada@parents.example").await;
    let term = t.published_template("Term 1", &[1_000]).await;

    let (status, body) = t
        .post(
            "/invoices?no_email=true",
            json!({
                "student_ids": [ada],
                "template_id": term,
                "date": "2024-09-01",
                "due_date": "2024-08-31",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    let (_, list) = t.get("/invoices").await;
    assert!(list["items"].as_array().unwrap().is_empty());

    let (status, body) = t
        .post(
            "/invoices?no_email=true",
            json!({
                "student_ids": [ada],
                "template_id": term,
                "date": "2024-09-01",
                "due_date": "2024-09-30",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let invoice = body["items"][0]["invoice"].clone();
    let id = invoice["id"].as_str().unwrap();

    let (status, _) = t
        .patch(&format!("/invoices/{id}"), json!({ "due_date": "2024-08-01", "is_paid": true }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, stored) = t.get(&format!("/invoices/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored, invoice);

    let (status, updated) = t.patch(&format!("/invoices/{id}"), json!({ "is_paid": true })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_paid"], true);
    assert_eq!(updated["invoice_number"], invoice["invoice_number"]);
}

#[tokio::test]
async fn template_can_be_swapped_and_unset() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);
    let ada = t.student("Ada", "ada@parents.example").await;
    let term1 = t.published_template("Term 1", &[1_000]).await;
    let term2 = t.published_template("Term 2", &[700, 800]).await;

    let (_, body) = t
        .post(
            "/invoices?no_email=true",
            json!({ "student_ids": [ada], "template_id": term1, "due_date": "2999-01-01" }),
        )
        .await;
    let id = body["items"][0]["invoice"]["id"].as_str().unwrap().to_string();

    let (status, changed) = t
        .put(
            &format!("/invoices/{id}/template"),
            json!({ "template_id": term2, "prefill_amount": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{changed}");
    assert_eq!(changed["combination"], "Ada-Term 2");
    assert_eq!(changed["items"].as_array().unwrap().len(), 2);
    assert_eq!(changed["amount"], 1_500);

    let (status, unset) = t
        .put(&format!("/invoices/{id}/template"), json!({ "template_id": null }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unset["combination"], "Ada");
    assert!(unset["items"].as_array().unwrap().is_empty());
    assert_eq!(unset["name"], "");
}

#[tokio::test]
async fn request_errors_map_to_statuses() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);
    let ada = t.student("Ada", "ada@parents.example").await;
    let term = t.published_template("Term 1", &[1_000]).await;

    let (status, body) = t.get("/invoices/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = t.get(&format!("/invoices/{}", ada)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let create = |number: &str| {
        json!({
            "student_ids": [ada],
            "template_id": term,
            "due_date": "2999-01-01",
            "invoice_number": number,
        })
    };
    let (status, _) = t.post("/invoices?no_email=true", create("SCH-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = t.post("/invoices?no_email=true", create("SCH-1")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn tenants_are_isolated() {
    let srv = TestServer::spawn().await;
    let t1 = Tenant::new(&srv);
    let t2 = Tenant::new(&srv);
    let ada = t1.student("Ada", "ada@parents.example").await;
    let term = t1.published_template("Term 1", &[1_000]).await;

    let (_, body) = t1
        .post(
            "/invoices?no_email=true",
            json!({ "student_ids": [ada], "template_id": term, "due_date": "2999-01-01" }),
        )
        .await;
    let id = body["items"][0]["invoice"]["id"].as_str().unwrap().to_string();

    let (status, _) = t2.get(&format!("/invoices/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t2.post(&format!("/invoices/{id}/send"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, list) = t2.get("/students").await;
    assert!(list["items"].as_array().unwrap().is_empty());

    // The other tenant's sequence starts fresh.
    let bob = t2.student("Bob", "bob@parents.example").await;
    let term2 = t2.published_template("Term 1", &[1_000]).await;
    let (_, body) = t2
        .post(
            "/invoices?no_email=true",
            json!({ "student_ids": [bob], "template_id": term2, "due_date": "2999-01-01" }),
        )
        .await;
    assert_eq!(body["items"][0]["invoice"]["invoice_number"], "INV/00001");
}
