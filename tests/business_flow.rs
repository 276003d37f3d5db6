//! Business-side flows: checkout with stock + cash-flow annex, inventory
//! guards, expenses, charges, the client statement, and profile upsert.

mod common;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{state_with, MockLive, MockRows};
use gestor::auth::Actor;
use gestor::clients::ClientStore;
use gestor::finance::FinanceStore;
use gestor::products::{NewProduct, ProductStore};
use gestor::profiles::ProfileStore;
use gestor::sales::{NewSaleItem, SaleStore};
use gestor::StoreError;

fn product_row(id: Uuid, name: &str, stock: i32) -> Value {
    json!({
        "id": id,
        "name": name,
        "sku": null,
        "description": null,
        "price": "25.00",
        "cost": null,
        "unit": "unit",
        "stock_quantity": stock,
        "low_stock_threshold": 5,
        "is_active": true,
        "created_at": Utc::now(),
        "updated_at": Utc::now(),
    })
}

#[tokio::test]
async fn checkout_decrements_stock_and_records_cash_flow() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = SaleStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };
    let product = Uuid::new_v4();

    rows.seed("products", vec![product_row(product, "Coffee beans 1kg", 10)]);

    let sale = store
        .checkout(
            Some(&actor),
            None,
            vec![NewSaleItem {
                product_id: product,
                quantity: 3,
                unit_price: 25.0,
            }],
            0.0,
            "cash",
        )
        .await
        .unwrap();

    assert_eq!(rows.rows("sales").len(), 1);
    assert_eq!(rows.rows("sale_items").len(), 1);
    assert_eq!(rows.rows("products")[0]["stock_quantity"], json!(7));

    let flow = rows.rows("cash_flow");
    assert_eq!(flow.len(), 1);
    assert_eq!(flow[0]["kind"], json!("inflow"));
    assert_eq!(flow[0]["reference_id"], json!(sale.id.to_string()));
}

#[tokio::test]
async fn checkout_refuses_to_oversell() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = SaleStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };
    let product = Uuid::new_v4();

    rows.seed("products", vec![product_row(product, "Notebook", 2)]);

    let err = store
        .checkout(
            Some(&actor),
            None,
            vec![NewSaleItem {
                product_id: product,
                quantity: 3,
                unit_price: 12.0,
            }],
            0.0,
            "card",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Validation(_)));
    assert!(rows.rows("sales").is_empty(), "nothing was written");
    assert_eq!(rows.rows("products")[0]["stock_quantity"], json!(2));
}

#[tokio::test]
async fn cash_flow_failure_does_not_void_the_sale() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = SaleStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };
    let product = Uuid::new_v4();

    rows.seed("products", vec![product_row(product, "Mug", 4)]);
    rows.fail_insert_on("cash_flow");

    store
        .checkout(
            Some(&actor),
            None,
            vec![NewSaleItem {
                product_id: product,
                quantity: 1,
                unit_price: 18.0,
            }],
            0.0,
            "pix",
        )
        .await
        .expect("the sale stands even when the annex write fails");

    assert_eq!(rows.rows("sales").len(), 1);
    assert!(rows.rows("cash_flow").is_empty());
}

#[tokio::test]
async fn stock_adjustments_cannot_go_negative() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = ProductStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };
    let product = Uuid::new_v4();

    rows.seed("products", vec![product_row(product, "Cable", 2)]);

    let err = store
        .adjust_stock(Some(&actor), product, -5)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(rows.rows("products")[0]["stock_quantity"], json!(2));

    let left = store.adjust_stock(Some(&actor), product, -2).await.unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn negative_prices_never_leave_the_client() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = ProductStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    let err = store
        .create(
            Some(&actor),
            NewProduct {
                name: "Broken".to_string(),
                sku: None,
                description: None,
                price: -1.0,
                cost: None,
                unit: None,
                stock_quantity: None,
                low_stock_threshold: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(rows.call_count(), 0);
}

#[tokio::test]
async fn paying_an_expense_records_the_outflow() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = FinanceStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    let expense = store
        .add_expense(Some(&actor), "rent", Some("fixed".to_string()), 1500.0, None)
        .await
        .unwrap();
    store.mark_expense_paid(Some(&actor), expense.id).await.unwrap();

    assert_eq!(rows.rows("expenses")[0]["is_paid"], json!(true));
    let flow = rows.rows("cash_flow");
    assert_eq!(flow.len(), 1);
    assert_eq!(flow[0]["kind"], json!("outflow"));

    // settling twice adds nothing
    store.mark_expense_paid(Some(&actor), expense.id).await.unwrap();
    assert_eq!(rows.rows("cash_flow").len(), 1);
}

#[tokio::test]
async fn settled_charges_show_up_in_the_client_statement() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let finance = FinanceStore::new(&state);
    let clients = ClientStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    let client = clients
        .create(Some(&actor), "Mercearia do Zé", None, None, None)
        .await
        .unwrap();
    let paid = finance
        .create_charge(Some(&actor), Some(client.id), 120.0)
        .await
        .unwrap();
    finance.mark_charge_paid(Some(&actor), paid.id).await.unwrap();
    finance
        .create_charge(Some(&actor), Some(client.id), 80.0)
        .await
        .unwrap();

    let statement = clients.statement(client.id).await.unwrap();
    assert_eq!(statement.charges.len(), 2);
    assert_eq!(statement.outstanding.to_string(), "80");
}

#[tokio::test]
async fn profile_save_upserts_for_the_actor() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = ProfileStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    store
        .save(Some(&actor), "Ana", Some("Padaria Central".to_string()), None)
        .await
        .unwrap();
    assert_eq!(rows.rows("profiles").len(), 1);

    store
        .save(Some(&actor), "Ana Souza", Some("Padaria Central".to_string()), None)
        .await
        .unwrap();
    assert_eq!(rows.rows("profiles").len(), 1, "second save patches in place");
    assert_eq!(rows.rows("profiles")[0]["display_name"], json!("Ana Souza"));

    store.open(Some(actor.id)).await.unwrap();
    assert_eq!(store.current().await.unwrap().display_name, "Ana Souza");
}
