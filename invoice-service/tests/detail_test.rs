//! Nested detail endpoint integration tests.

mod common;

use common::{widget_invoice, TestApp};
use serde_json::json;

#[tokio::test]
async fn add_and_list_details() {
    let Some(app) = TestApp::spawn().await else {
        eprintln!("Skipping: TEST_DATABASE_URL is not set");
        return;
    };

    let invoice = app.create_invoice(&widget_invoice("INV-D100")).await;
    let id = invoice["id"].as_str().expect("Missing id");

    let resp = app
        .client
        .post(format!("{}/invoices/{}/details", app.address, id))
        .json(&json!({"description": "Gadget", "quantity": 3, "unit_price": "4.50"}))
        .send()
        .await
        .expect("Failed to send create detail");
    assert_eq!(resp.status().as_u16(), 201);
    let created: serde_json::Value = resp.json().await.expect("Invalid detail body");
    assert_eq!(created["description"], "Gadget");
    assert_eq!(created["line_total"], "13.50");
    assert_eq!(created["invoice_id"], id);

    let (status, body) = app.get_json(&format!("/invoices/{}/details", id)).await;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().expect("Expected array").len(), 2);

    app.cleanup().await;
}

#[tokio::test]
async fn add_detail_to_unknown_invoice_returns_not_found() {
    let Some(app) = TestApp::spawn().await else {
        eprintln!("Skipping: TEST_DATABASE_URL is not set");
        return;
    };

    let resp = app
        .client
        .post(format!(
            "{}/invoices/99999999-9999-9999-9999-999999999999/details",
            app.address
        ))
        .json(&json!({"description": "Gadget", "quantity": 1, "unit_price": "1.00"}))
        .send()
        .await
        .expect("Failed to send create detail");
    assert_eq!(resp.status().as_u16(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn add_detail_with_invalid_price_scale_is_rejected() {
    let Some(app) = TestApp::spawn().await else {
        eprintln!("Skipping: TEST_DATABASE_URL is not set");
        return;
    };

    let invoice = app.create_invoice(&widget_invoice("INV-D110")).await;
    let id = invoice["id"].as_str().expect("Missing id");

    let resp = app
        .client
        .post(format!("{}/invoices/{}/details", app.address, id))
        .json(&json!({"description": "Gadget", "quantity": 1, "unit_price": "1.999"}))
        .send()
        .await
        .expect("Failed to send create detail");
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.expect("Invalid error body");
    assert!(body.to_string().contains("unit_price"));

    app.cleanup().await;
}

#[tokio::test]
async fn get_detail_is_scoped_to_its_invoice() {
    let Some(app) = TestApp::spawn().await else {
        eprintln!("Skipping: TEST_DATABASE_URL is not set");
        return;
    };

    let first = app.create_invoice(&widget_invoice("INV-D200")).await;
    let second = app.create_invoice(&widget_invoice("INV-D201")).await;
    let first_id = first["id"].as_str().expect("Missing id");
    let second_id = second["id"].as_str().expect("Missing id");
    let detail_id = first["details"][0]["id"].as_str().expect("Missing detail id");

    // The right parent finds it.
    let (status, body) = app
        .get_json(&format!("/invoices/{}/details/{}", first_id, detail_id))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["id"], detail_id);

    // The wrong parent does not, even though the detail exists.
    let (status, _) = app
        .get_json(&format!("/invoices/{}/details/{}", second_id, detail_id))
        .await;
    assert_eq!(status, 404);

    app.cleanup().await;
}

#[tokio::test]
async fn partial_update_recomputes_line_total() {
    let Some(app) = TestApp::spawn().await else {
        eprintln!("Skipping: TEST_DATABASE_URL is not set");
        return;
    };

    let invoice = app.create_invoice(&widget_invoice("INV-D300")).await;
    let id = invoice["id"].as_str().expect("Missing id");
    let detail_id = invoice["details"][0]["id"].as_str().expect("Missing detail id");

    // Only the quantity changes; unit price carries over from the stored row.
    let resp = app
        .client
        .put(format!(
            "{}/invoices/{}/details/{}",
            app.address, id, detail_id
        ))
        .json(&json!({"quantity": 5}))
        .send()
        .await
        .expect("Failed to send update detail");
    assert_eq!(resp.status().as_u16(), 200);
    let updated: serde_json::Value = resp.json().await.expect("Invalid detail body");
    assert_eq!(updated["quantity"], 5);
    assert_eq!(updated["unit_price"], "10.00");
    assert_eq!(updated["line_total"], "50.00");
    assert_eq!(updated["description"], "Widget");

    app.cleanup().await;
}

#[tokio::test]
async fn update_detail_rejects_negative_quantity() {
    let Some(app) = TestApp::spawn().await else {
        eprintln!("Skipping: TEST_DATABASE_URL is not set");
        return;
    };

    let invoice = app.create_invoice(&widget_invoice("INV-D310")).await;
    let id = invoice["id"].as_str().expect("Missing id");
    let detail_id = invoice["details"][0]["id"].as_str().expect("Missing detail id");

    let resp = app
        .client
        .put(format!(
            "{}/invoices/{}/details/{}",
            app.address, id, detail_id
        ))
        .json(&json!({"quantity": -1}))
        .send()
        .await
        .expect("Failed to send update detail");
    assert_eq!(resp.status().as_u16(), 400);

    // The stored row is unchanged.
    let (_, detail) = app
        .get_json(&format!("/invoices/{}/details/{}", id, detail_id))
        .await;
    assert_eq!(detail["quantity"], 2);

    app.cleanup().await;
}

#[tokio::test]
async fn delete_detail_removes_it_from_the_invoice() {
    let Some(app) = TestApp::spawn().await else {
        eprintln!("Skipping: TEST_DATABASE_URL is not set");
        return;
    };

    let invoice = app.create_invoice(&widget_invoice("INV-D400")).await;
    let id = invoice["id"].as_str().expect("Missing id");
    let detail_id = invoice["details"][0]["id"].as_str().expect("Missing detail id");

    let resp = app
        .client
        .delete(format!(
            "{}/invoices/{}/details/{}",
            app.address, id, detail_id
        ))
        .send()
        .await
        .expect("Failed to send delete detail");
    assert_eq!(resp.status().as_u16(), 204);

    let (status, body) = app.get_json(&format!("/invoices/{}/details", id)).await;
    assert_eq!(status, 200);
    assert!(body.as_array().expect("Expected array").is_empty());

    // The invoice itself survives with an empty detail list.
    let (status, body) = app.get_json(&format!("/invoices/{}", id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["invoice_number"], "INV-D400");

    // A second delete finds nothing.
    let resp = app
        .client
        .delete(format!(
            "{}/invoices/{}/details/{}",
            app.address, id, detail_id
        ))
        .send()
        .await
        .expect("Failed to send delete detail");
    assert_eq!(resp.status().as_u16(), 404);

    app.cleanup().await;
}
