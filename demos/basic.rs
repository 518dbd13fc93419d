use finwise::{ErrorKind, FinwiseClient};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    let client = FinwiseClient::from_env()?;

    let account = client.post(
        "/accounts",
        Some(&json!({
            "name": "Emergency Fund",
            "type": "depository",
            "subType": "savings",
            "currency": "USD"
        })),
        None,
    )?;
    println!("created {account}");

    let query = vec![("pageSize".to_owned(), "10".to_owned())];
    let transactions = client.get("/transactions", Some(&query))?;
    println!("{transactions}");

    match client.get("/accounts/does-not-exist", None) {
        Err(err) if err.kind() == Some(ErrorKind::NotFound) => {
            println!("not found (request id {:?})", err.request_id());
        }
        other => println!("{other:?}"),
    }

    client.close();
    Ok(())
}
