//! Heuristic transaction-input decoding.
//!
//! A fixed table of 4-byte method selectors maps calldata to human-readable
//! actions; a second table attaches names to well-known contracts. When the
//! selector is unknown but a receipt is available, ERC-20 `Transfer` events
//! classify the call as a swap or token transfer. Swap pricing assumes 18
//! decimals for every token and labels the first transfer as the "in" leg,
//! which is not universally correct for multi-hop trades.

use crate::config::parse_hex_u256;
use alloy_primitives::U256;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// `keccak256("Transfer(address,address,uint256)")`.
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

static METHOD_SIGNATURES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("0xa9059cbb", "transfer(address,uint256)"),
        ("0x23b872dd", "transferFrom(address,address,uint256)"),
        ("0x095ea7b3", "approve(address,uint256)"),
        (
            "0x38ed1739",
            "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)",
        ),
        (
            "0x7ff36ab5",
            "swapExactETHForTokens(uint256,address[],address,uint256)",
        ),
        (
            "0x18cbafe5",
            "swapExactTokensForETH(uint256,uint256,address[],address,uint256)",
        ),
        (
            "0xfb3bdb41",
            "swapETHForExactTokens(uint256,address[],address,uint256)",
        ),
        (
            "0x8803dbee",
            "swapTokensForExactTokens(uint256,uint256,address[],address,uint256)",
        ),
        (
            "0x791ac947",
            "swapExactTokensForTokensSupportingFeeOnTransferTokens(uint256,uint256,address[],address,uint256)",
        ),
        (
            "0xb6f9de95",
            "swapExactETHForTokensSupportingFeeOnTransferTokens(uint256,address[],address,uint256)",
        ),
        (
            "0x5c11d795",
            "swapExactTokensForETHSupportingFeeOnTransferTokens(uint256,uint256,address[],address,uint256)",
        ),
        ("0xd0e30db0", "deposit()"),
        ("0x2e1a7d4d", "withdraw(uint256)"),
        ("0xb6b55f25", "deposit(uint256)"),
        ("0x3ccfd60b", "withdraw()"),
        ("0x4e71d92d", "claim()"),
        ("0x379607f5", "claim(uint256)"),
        ("0x2e7ba6ef", "claimReward()"),
        ("0xe6f1daf2", "claimRewards()"),
        ("0x40c10f19", "mint(address,uint256)"),
        ("0xa0712d68", "mint(uint256)"),
        ("0x6a627842", "mint(address)"),
        (
            "0x94bf804d",
            "mintWithSignature((address,uint256,string,uint256,uint256,bytes32,bytes))",
        ),
        ("0xb61d27f6", "execute(address,uint256,bytes)"),
        ("0x1cff79cd", "execute(address,bytes)"),
        (
            "0x1fad948c",
            "handleOps((address,uint256,bytes,bytes,uint256,uint256,uint256,uint256,uint256,bytes,bytes)[],address)",
        ),
        ("0x590e1ae3", "refund()"),
        ("0xfa89401a", "refund(address)"),
    ])
});

static KNOWN_CONTRACTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("0x7a250d5630b4cf539739df2c5dacb4c659f2488d", "Uniswap V2 Router"),
        ("0xe592427a0aece92de3edee1f18e0157c05861564", "Uniswap V3 Router"),
        ("0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45", "Uniswap V3 Router 2"),
        ("0xef1c6e67703c7bd7107eed8303fbe6ec2554bf6b", "Uniswap Universal Router"),
        ("0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f", "SushiSwap Router"),
        ("0x1111111254eeb25477b68fb85ed929f73a960582", "1inch V5 Router"),
        ("0xa5e0829caced8ffdd4de3c43696c57f7d7a678ff", "QuickSwap Router"),
        ("0xdac17f958d2ee523a2206206994597c13d831ec7", "Tether USD (USDT)"),
        ("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USD Coin (USDC)"),
        ("0x6b175474e89094c44da98b954eedeac495271d0f", "Dai Stablecoin (DAI)"),
        ("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "Wrapped Ether (WETH)"),
        ("0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", "Wrapped BTC (WBTC)"),
    ])
});

/// Human-readable summary of what a transaction does.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecodedTx {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method_signature: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub contract_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub action_type: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl DecodedTx {
    fn detail(&mut self, key: &str, value: impl Into<Value>) {
        self.details.insert(key.to_string(), value.into());
    }
}

/// Extracts meaningful info from transaction input data.
///
/// Pure function: `(input, to, value, receipt)` in, a decoded summary (or
/// `None` for undecodable input) out.
#[must_use]
pub fn decode_transaction_input(
    input: &str,
    to: Option<&str>,
    value: &str,
    receipt: Option<&Value>,
) -> Option<DecodedTx> {
    if input.is_empty() || input == "0x" {
        let mut decoded = DecodedTx {
            action: "ETH Transfer".to_string(),
            ..DecodedTx::default()
        };
        decoded.detail("type", "native_transfer");
        decoded.detail(
            "description",
            "Simple Ether transfer (no contract interaction)",
        );
        return Some(decoded);
    }
    if input.len() < 10 {
        return None;
    }

    let selector = &input[..10];
    let method_name = METHOD_SIGNATURES.get(selector).copied();
    let mut decoded = DecodedTx {
        method_signature: selector.to_string(),
        method_name: method_name.unwrap_or_default().to_string(),
        ..DecodedTx::default()
    };
    if let Some(to) = to {
        let to_addr = to.to_lowercase();
        if let Some(name) = KNOWN_CONTRACTS.get(to_addr.as_str()) {
            decoded.contract_type = (*name).to_string();
            decoded.detail("contract_name", *name);
            decoded.detail("contract_address", to_addr);
        }
    }

    let Some(method_name) = method_name else {
        decode_unknown(&mut decoded, value, receipt);
        return Some(decoded);
    };

    if method_name.starts_with("transfer(") {
        decoded.action_type = "transfer".to_string();
        decode_transfer(&mut decoded, input);
    } else if method_name.starts_with("transferFrom(") {
        decoded.action_type = "transferFrom".to_string();
        decode_transfer_from(&mut decoded, input);
    } else if method_name.contains("swap") || method_name.contains("Swap") {
        decoded.action_type = "swap".to_string();
        decode_swap(&mut decoded, input, value, receipt);
    } else if method_name.starts_with("approve(") {
        decoded.action_type = "approve".to_string();
        decode_approve(&mut decoded, input);
    } else if method_name.starts_with("deposit(") {
        decoded.action_type = "deposit".to_string();
        decode_deposit(&mut decoded, input, value);
    } else if method_name.starts_with("withdraw(") {
        decoded.action_type = "withdraw".to_string();
        decode_withdraw(&mut decoded, input);
    } else if method_name.starts_with("mint(") || method_name.contains("mint") {
        decoded.action_type = "mint".to_string();
        decode_mint(&mut decoded, input);
    } else if method_name.starts_with("claim(")
        || method_name.contains("claim")
        || method_name.contains("Claim")
    {
        decoded.action_type = "claim".to_string();
        decode_claim(&mut decoded, receipt);
    } else if method_name.starts_with("execute(") {
        decoded.action_type = "execute".to_string();
        decode_execute(&mut decoded, input);
    } else if method_name.contains("handleOps") {
        decoded.action_type = "handleOps".to_string();
        decode_handle_ops(&mut decoded);
    } else if method_name.starts_with("refund(") {
        decoded.action_type = "refund".to_string();
        decode_refund(&mut decoded, receipt);
    }
    Some(decoded)
}

/// Unknown selector: classify via receipt transfer events when available,
/// otherwise describe a generic contract call.
fn decode_unknown(decoded: &mut DecodedTx, value: &str, receipt: Option<&Value>) {
    decoded.action_type = "contract_call".to_string();
    decoded.action = "Contract Interaction".to_string();
    decoded.detail("type", "contract_call");
    decoded.detail("method_selector", decoded.method_signature.clone());

    if let Some(receipt) = receipt {
        extract_transfer_events(decoded, receipt);
        let transfer_count = decoded
            .details
            .get("transfers")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if transfer_count >= 2 {
            decoded.action_type = "swap".to_string();
            decoded.action = "Token Swap".to_string();
            decoded.detail("type", "dex_swap");
            decoded.detail(
                "description",
                format!("Token swap detected ({transfer_count} token transfers)"),
            );
            calculate_swap_price(decoded);
        } else if transfer_count == 1 {
            decoded.action_type = "transfer".to_string();
            decoded.action = "Token Transfer".to_string();
            decoded.detail("type", "token_transfer");
            decoded.detail("description", "Token transfer via contract call");
        } else {
            decoded.detail("description", "Contract function call");
        }
    } else if has_nonzero_value(value) {
        decoded.detail(
            "description",
            format!("Contract call with {} ETH", wei_to_eth_string(value)),
        );
    } else {
        decoded.detail("description", "Contract function call");
    }
}

fn has_nonzero_value(value: &str) -> bool {
    if value.is_empty() || value == "0x0" || value == "0x" {
        return false;
    }
    parse_hex_u256(value).is_some_and(|v| v > U256::ZERO)
}

fn decode_transfer(decoded: &mut DecodedTx, input: &str) {
    decoded.action = "Token Transfer".to_string();
    decoded.detail("type", "erc20_transfer");
    let Some(recipient) = input.get(34..74) else {
        return;
    };
    let recipient = format!("0x{recipient}");
    if let Some(amount) = input.get(74..138).and_then(parse_hex_u256) {
        decoded.detail("recipient", recipient.to_lowercase());
        decoded.detail("amount_wei", format!("0x{amount:x}"));
        decoded.detail(
            "description",
            format!("Transfer tokens to {}", shorten_hash(&recipient)),
        );
    }
}

fn decode_approve(decoded: &mut DecodedTx, input: &str) {
    decoded.action = "Token Approval".to_string();
    decoded.detail("type", "erc20_approval");
    let Some(spender) = input.get(34..74) else {
        return;
    };
    let spender = format!("0x{spender}");
    if let Some(amount) = input.get(74..138).and_then(parse_hex_u256) {
        decoded.detail("spender", spender.to_lowercase());
        decoded.detail("amount_wei", format!("0x{amount:x}"));
        if amount == U256::MAX {
            decoded.detail(
                "description",
                format!("Grant unlimited approval to {}", shorten_hash(&spender)),
            );
            decoded.detail("unlimited", true);
        } else {
            decoded.detail(
                "description",
                format!("Approve {} to spend tokens", shorten_hash(&spender)),
            );
        }
    }
}

fn decode_transfer_from(decoded: &mut DecodedTx, input: &str) {
    decoded.action = "Token Transfer From".to_string();
    decoded.detail("type", "erc20_transfer_from");
    let (Some(from), Some(to)) = (input.get(34..74), input.get(98..138)) else {
        return;
    };
    let from = format!("0x{from}");
    let to = format!("0x{to}");
    if let Some(amount) = input.get(138..202).and_then(parse_hex_u256) {
        decoded.detail("from", from.to_lowercase());
        decoded.detail("to", to.to_lowercase());
        decoded.detail("amount_wei", format!("0x{amount:x}"));
        decoded.detail(
            "description",
            format!(
                "Transfer tokens from {} to {}",
                shorten_hash(&from),
                shorten_hash(&to)
            ),
        );
    }
}

fn decode_swap(decoded: &mut DecodedTx, input: &str, value: &str, receipt: Option<&Value>) {
    decoded.action = "Token Swap".to_string();
    decoded.detail("type", "dex_swap");
    if input.len() >= 200 {
        decoded.detail("description", "Swap tokens via DEX (Uniswap/SushiSwap/etc)");
        if has_nonzero_value(value) {
            decoded.detail("swap_type", "eth_to_token");
            decoded.detail("eth_in", value);
        }
    }
    if let Some(receipt) = receipt {
        extract_transfer_events(decoded, receipt);
        calculate_swap_price(decoded);
    }
}

fn decode_deposit(decoded: &mut DecodedTx, input: &str, value: &str) {
    decoded.action = "Deposit".to_string();
    decoded.detail("type", "deposit");
    if has_nonzero_value(value) {
        decoded.detail("eth_amount", value);
        decoded.detail(
            "description",
            format!("Deposit {} ETH", wei_to_eth_string(value)),
        );
    } else if let Some(amount) = input.get(10..74).and_then(parse_hex_u256) {
        if amount > U256::ZERO {
            decoded.detail("amount_wei", format!("0x{amount:x}"));
            decoded.detail("description", "Deposit tokens");
        } else {
            decoded.detail("description", "Deposit");
        }
    } else {
        decoded.detail("description", "Deposit");
    }
}

fn decode_withdraw(decoded: &mut DecodedTx, input: &str) {
    decoded.action = "Withdraw".to_string();
    decoded.detail("type", "withdraw");
    if input.len() >= 74 {
        match input.get(10..74).and_then(parse_hex_u256) {
            Some(amount) if amount > U256::ZERO => {
                let amount_hex = format!("0x{amount:x}");
                decoded.detail(
                    "description",
                    format!("Withdraw {} tokens/ETH", wei_to_eth_string(&amount_hex)),
                );
                decoded.detail("amount_wei", amount_hex);
            }
            _ => decoded.detail("description", "Withdraw"),
        }
    } else {
        decoded.detail("description", "Withdraw all");
    }
}

fn decode_mint(decoded: &mut DecodedTx, input: &str) {
    decoded.action = "Mint".to_string();
    decoded.detail("type", "mint");
    if let Some(addr) = input.get(34..74) {
        decoded.detail("to_address", format!("0x{addr}").to_lowercase());
        if let Some(amount) = input.get(74..138).and_then(parse_hex_u256) {
            decoded.detail("amount", format!("0x{amount:x}"));
        }
    }
    if decoded.method_name.contains("Signature") {
        decoded.detail("description", "Mint with Signature (gasless mint)");
    } else {
        decoded.detail("description", "Mint tokens/NFT");
    }
}

fn decode_claim(decoded: &mut DecodedTx, receipt: Option<&Value>) {
    decoded.action = "Claim".to_string();
    decoded.detail("type", "claim");
    let Some(receipt) = receipt else {
        decoded.detail("description", "Claim rewards/tokens");
        return;
    };
    extract_transfer_events(decoded, receipt);
    let first = decoded
        .details
        .get("transfers")
        .and_then(Value::as_array)
        .and_then(|t| t.first())
        .cloned();
    if let Some(first) = first {
        decoded.detail("claimed_amount", first["amount"].clone());
        decoded.detail("claimed_token", first["token"].clone());
        match first.get("token_name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => {
                decoded.detail("description", format!("Claim {name} rewards"));
            }
            _ => decoded.detail("description", "Claim rewards"),
        }
    } else {
        decoded.detail("description", "Claim rewards");
    }
}

fn decode_execute(decoded: &mut DecodedTx, input: &str) {
    decoded.action = "Execute".to_string();
    decoded.detail("type", "execute");
    decoded.detail(
        "description",
        "Execute transaction via smart contract wallet/multisig",
    );
    if let Some(target) = input.get(34..74) {
        decoded.detail("target", format!("0x{target}").to_lowercase());
    }
}

fn decode_handle_ops(decoded: &mut DecodedTx) {
    decoded.action = "Handle Operations".to_string();
    decoded.detail("type", "handle_ops");
    decoded.detail(
        "description",
        "Process bundled user operations (ERC-4337 Account Abstraction)",
    );
}

fn decode_refund(decoded: &mut DecodedTx, receipt: Option<&Value>) {
    decoded.action = "Refund".to_string();
    decoded.detail("type", "refund");
    if let Some(receipt) = receipt {
        extract_transfer_events(decoded, receipt);
    }
    decoded.detail("description", "Refund ETH/tokens");
}

/// Pulls ERC-20 `Transfer` events out of a receipt into `details.transfers`.
fn extract_transfer_events(decoded: &mut DecodedTx, receipt: &Value) {
    let Some(logs) = receipt.get("logs").and_then(Value::as_array) else {
        return;
    };
    let mut transfers = Vec::new();
    for log in logs {
        let Some(topics) = log.get("topics").and_then(Value::as_array) else {
            continue;
        };
        if topics.len() < 3 || topics[0].as_str() != Some(TRANSFER_TOPIC) {
            continue;
        }
        let (Some(from_topic), Some(to_topic)) = (topics[1].as_str(), topics[2].as_str()) else {
            continue;
        };
        let (Some(from), Some(to)) = (from_topic.get(26..), to_topic.get(26..)) else {
            continue;
        };
        let token = log
            .get("address")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let data = log.get("data").and_then(Value::as_str).unwrap_or_default();
        let mut amount_hex = data.trim_start_matches("0x").to_string();
        if amount_hex.is_empty() {
            amount_hex = "0".to_string();
        }
        transfers.push(json!({
            "token": token,
            "from": format!("0x{from}").to_lowercase(),
            "to": format!("0x{to}").to_lowercase(),
            "amount": format!("0x{amount_hex}"),
            "token_name": KNOWN_CONTRACTS.get(token.as_str()).copied().unwrap_or(""),
        }));
    }
    if !transfers.is_empty() {
        let count = transfers.len();
        decoded.detail("transfers", transfers);
        decoded.detail("transfer_count", count);
        if count >= 2 {
            decoded.detail(
                "description",
                format!("Swapped via DEX ({count} token transfers detected)"),
            );
        }
    }
}

/// Derives swap pricing from the first two transfer events, assuming 18
/// decimals for both tokens.
fn calculate_swap_price(decoded: &mut DecodedTx) {
    let Some(transfers) = decoded.details.get("transfers").and_then(Value::as_array) else {
        return;
    };
    if transfers.len() < 2 {
        return;
    }
    let token_in = transfers[0].clone();
    let token_out = transfers[1].clone();
    let (Some(amount_in), Some(amount_out)) = (
        transfer_amount_eth(&token_in),
        transfer_amount_eth(&token_out),
    ) else {
        return;
    };

    let rate = amount_out / amount_in;
    decoded.detail("swap_from_token", token_in["token"].clone());
    decoded.detail("swap_from_token_name", token_in["token_name"].clone());
    decoded.detail("swap_from_amount", token_in["amount"].clone());
    decoded.detail("swap_from_amount_formatted", format!("{amount_in:.6}"));
    decoded.detail("swap_to_token", token_out["token"].clone());
    decoded.detail("swap_to_token_name", token_out["token_name"].clone());
    decoded.detail("swap_to_amount", token_out["amount"].clone());
    decoded.detail("swap_to_amount_formatted", format!("{amount_out:.6}"));
    decoded.detail("exchange_rate", format!("{rate:.6}"));
    let name_in = display_token(&token_in);
    let name_out = display_token(&token_out);
    decoded.detail(
        "price_per_token",
        format!("1 {name_in} = {rate:.6} {name_out}"),
    );
}

fn transfer_amount_eth(transfer: &Value) -> Option<f64> {
    let raw = transfer.get("amount").and_then(Value::as_str)?;
    let amount = parse_hex_u256(raw)?;
    let whole: f64 = amount.to_string().parse().ok()?;
    Some(whole / 1e18)
}

fn display_token(transfer: &Value) -> String {
    match transfer.get("token_name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => shorten_hash(transfer.get("token").and_then(Value::as_str).unwrap_or("")),
    }
}

/// `0xabcdef…1234` style shortening for display.
#[must_use]
pub fn shorten_hash(addr: &str) -> String {
    if addr.len() <= 10 {
        return addr.to_string();
    }
    format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
}

fn wei_to_eth_string(wei_hex: &str) -> String {
    let Some(wei) = parse_hex_u256(wei_hex) else {
        return "0".to_string();
    };
    let eth: f64 = wei.to_string().parse().unwrap_or(0.0);
    format!("{:.6}", eth / 1e18)
}
