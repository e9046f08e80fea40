//! JSON-RPC ledger reader using `eth_call` against the deployed contracts.

use super::abi::{self, Word};
use super::{ApproxHint, LedgerError, LedgerReader};
use crate::config::{BranchConfig, Config};
use crate::domain::{Address, Decimal, InterestRate, Position, PositionId, RawOrder, Side};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const GET_SIZE: &str = "getSize()";
const GET_APPROX_HINT: &str = "getApproxHint(uint256,uint256,uint256,uint256)";
const FIND_INSERT_POSITION: &str = "findInsertPosition(uint256,uint256,uint256)";
const GET_LATEST_TROVE_DATA: &str = "getLatestTroveData(uint256)";
const GET_OFFER: &str = "getOffer(uint256)";
const GET_DEMAND: &str = "getDemand(uint256)";
const OFFER_COUNT: &str = "offerCount()";
const DEMAND_COUNT: &str = "demandCount()";

/// Ledger reader backed by an Ethereum JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcLedgerReader {
    client: Client,
    rpc_url: String,
    branches: Vec<BranchConfig>,
    order_book: Option<Address>,
    max_elapsed: Duration,
}

impl RpcLedgerReader {
    pub fn new(rpc_url: String, branches: Vec<BranchConfig>, order_book: Option<Address>) -> Self {
        Self {
            client: Client::new(),
            rpc_url,
            branches,
            order_book,
            max_elapsed: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.rpc_url.clone(),
            config.branches.clone(),
            config.order_book_address.clone(),
        )
    }

    fn branch(&self, index: u32) -> Result<&BranchConfig, LedgerError> {
        self.branches
            .iter()
            .find(|b| b.index == index)
            .ok_or(LedgerError::BranchNotFound(index))
    }

    fn order_book(&self) -> Result<&Address, LedgerError> {
        self.order_book
            .as_ref()
            .ok_or_else(|| LedgerError::NotConfigured("ORDER_BOOK_ADDRESS".to_string()))
    }

    /// `eth_call` at the latest block, returning the decoded result words.
    async fn call(
        &self,
        to: &Address,
        signature: &str,
        args: &[Word],
    ) -> Result<Vec<Word>, LedgerError> {
        let data = format!("0x{}", hex::encode(abi::encode_call(signature, args)));
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": to.as_str(), "data": data }, "latest"]
        });

        let response = self.post_rpc(payload).await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("call reverted")
                .to_string();
            return Err(LedgerError::Unavailable(format!("{}: {}", signature, message)));
        }

        let result = response
            .get("result")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LedgerError::ParseError("Missing result field".to_string()))?;
        let bytes = hex::decode(result.trim_start_matches("0x"))
            .map_err(|e| LedgerError::ParseError(format!("Invalid result hex: {}", e)))?;
        if bytes.is_empty() {
            // No code at the address returns empty data rather than an error.
            return Err(LedgerError::Unavailable(format!(
                "{}: empty return data from {}",
                signature, to
            )));
        }
        abi::decode_words(&bytes).map_err(|e| LedgerError::ParseError(e.to_string()))
    }

    async fn post_rpc(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, LedgerError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&self.rpc_url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(LedgerError::NetworkError(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(LedgerError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(LedgerError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(LedgerError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(LedgerError::ParseError(e.to_string())))
        })
        .await
    }
}

fn parse_err(e: abi::AbiError) -> LedgerError {
    LedgerError::ParseError(e.to_string())
}

#[async_trait]
impl LedgerReader for RpcLedgerReader {
    async fn get_list_size(&self, branch: u32) -> Result<u64, LedgerError> {
        let sorted = self.branch(branch)?.sorted_troves.clone();
        let words = self.call(&sorted, GET_SIZE, &[]).await?;
        abi::expect_words(&words, 1).map_err(parse_err)?;
        abi::word_to_u64(&words[0]).map_err(parse_err)
    }

    async fn get_approx_hint(
        &self,
        branch: u32,
        rate: InterestRate,
        num_trials: u64,
        seed: u64,
    ) -> Result<ApproxHint, LedgerError> {
        let helpers = self.branch(branch)?.hint_helpers.clone();
        debug!(
            "getApproxHint branch={} rate={} trials={} seed={}",
            branch, rate, num_trials, seed
        );
        let args = [
            abi::word_from_u64(branch as u64),
            abi::word_from_u128(rate.as_wad()),
            abi::word_from_u64(num_trials),
            abi::word_from_u64(seed),
        ];
        let words = self.call(&helpers, GET_APPROX_HINT, &args).await?;
        abi::expect_words(&words, 3).map_err(parse_err)?;
        Ok(ApproxHint {
            hint_id: abi::word_to_id(&words[0]),
            // A diff beyond 128 bits is as bad as it gets.
            diff: abi::word_to_u128(&words[1]).unwrap_or(u128::MAX),
            latest_seed: abi::word_low_u64(&words[2]),
        })
    }

    async fn find_insert_position(
        &self,
        branch: u32,
        rate: InterestRate,
        prev_id: PositionId,
        next_id: PositionId,
    ) -> Result<(PositionId, PositionId), LedgerError> {
        let sorted = self.branch(branch)?.sorted_troves.clone();
        let args = [
            abi::word_from_u128(rate.as_wad()),
            abi::word_from_id(&prev_id),
            abi::word_from_id(&next_id),
        ];
        let words = self.call(&sorted, FIND_INSERT_POSITION, &args).await?;
        abi::expect_words(&words, 2).map_err(parse_err)?;
        Ok((abi::word_to_id(&words[0]), abi::word_to_id(&words[1])))
    }

    async fn get_position(
        &self,
        branch: u32,
        id: PositionId,
    ) -> Result<Option<Position>, LedgerError> {
        let manager = self.branch(branch)?.trove_manager.clone();
        let words = self
            .call(&manager, GET_LATEST_TROVE_DATA, &[abi::word_from_id(&id)])
            .await?;
        decode_latest_trove_data(id, &words)
    }

    async fn get_order(&self, side: Side, id: u64) -> Result<Option<RawOrder>, LedgerError> {
        let book = self.order_book()?.clone();
        let signature = match side {
            Side::Borrow => GET_OFFER,
            Side::Lend => GET_DEMAND,
        };
        let words = self
            .call(&book, signature, &[abi::word_from_u64(id)])
            .await?;
        decode_order(side, id, &words)
    }

    async fn get_order_counter(&self, side: Side) -> Result<u64, LedgerError> {
        let book = self.order_book()?.clone();
        let signature = match side {
            Side::Borrow => OFFER_COUNT,
            Side::Lend => DEMAND_COUNT,
        };
        let words = self.call(&book, signature, &[]).await?;
        abi::expect_words(&words, 1).map_err(parse_err)?;
        abi::word_to_u64(&words[0]).map_err(parse_err)
    }
}

/// Decode `LatestTroveData`. A position with neither collateral nor debt is
/// not open.
fn decode_latest_trove_data(
    id: PositionId,
    words: &[Word],
) -> Result<Option<Position>, LedgerError> {
    abi::expect_words(words, 10).map_err(parse_err)?;
    let wad = |i: usize| -> Result<Decimal, LedgerError> {
        let raw = abi::word_to_u128(&words[i]).map_err(parse_err)?;
        Decimal::from_wad(raw)
            .ok_or_else(|| LedgerError::ParseError(format!("field {} out of range", i)))
    };

    let debt = wad(0)?;
    let collateral = wad(1)?;
    if debt.is_zero() && collateral.is_zero() {
        return Ok(None);
    }

    // Stored as recordedDebt * rate (both wad), i.e. 1e36-scaled.
    let weighted_raw = abi::word_to_u128(&words[7]).map_err(parse_err)?;
    let weighted_recorded_debt = Decimal::from_wad(weighted_raw / 1_000_000_000_000_000_000)
        .ok_or_else(|| LedgerError::ParseError("weighted debt out of range".to_string()))?;

    Ok(Some(Position {
        id,
        collateral,
        debt,
        annual_interest_rate: InterestRate::from_wad(
            abi::word_to_u128(&words[6]).map_err(parse_err)?,
        ),
        last_rate_adjustment: abi::word_to_u64(&words[9]).map_err(parse_err)?,
        recorded_debt: wad(5)?,
        weighted_recorded_debt,
    }))
}

/// Decode an order tuple. Fields that do not decode are left empty and the
/// record is rejected later during validation; a zero owner means the id was
/// never used.
fn decode_order(side: Side, id: u64, words: &[Word]) -> Result<Option<RawOrder>, LedgerError> {
    let expected = match side {
        Side::Borrow => 6,
        Side::Lend => 5,
    };
    abi::expect_words(words, expected).map_err(parse_err)?;

    let owner = abi::word_to_address(&words[0]).ok();
    if owner.as_ref().is_some_and(|o| *o == Address::zero()) {
        return Ok(None);
    }

    let min_collateral_ratio = match side {
        Side::Borrow => abi::word_to_u128(&words[5])
            .ok()
            .filter(|v| *v > 0)
            .and_then(Decimal::from_wad),
        Side::Lend => None,
    };

    Ok(Some(RawOrder {
        id,
        owner,
        amount: abi::word_to_u128(&words[1]).ok().and_then(Decimal::from_wad),
        rate: abi::word_to_u64(&words[2]).ok().map(Decimal::from_u64),
        duration_secs: abi::word_to_u64(&words[3]).ok(),
        active: abi::word_to_bool(&words[4]).ok(),
        min_collateral_ratio,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const WAD: u128 = 1_000_000_000_000_000_000;

    fn owner_word() -> Word {
        let addr = Address::parse("0x00000000000000000000000000000000000000aa").unwrap();
        abi::word_from_address(&addr)
    }

    #[test]
    fn test_decode_offer() {
        let words = vec![
            owner_word(),
            abi::word_from_u128(1_000 * WAD),
            abi::word_from_u64(500),
            abi::word_from_u64(86_400),
            abi::word_from_u64(1),
            abi::word_from_u128(3 * WAD / 2),
        ];
        let raw = decode_order(Side::Borrow, 7, &words).unwrap().unwrap();
        assert_eq!(raw.id, 7);
        assert_eq!(raw.amount, Some(Decimal::from_u64(1_000)));
        assert_eq!(raw.rate, Some(Decimal::from_u64(500)));
        assert_eq!(raw.active, Some(true));
        assert_eq!(raw.min_collateral_ratio, Some(Decimal::from_str("1.5").unwrap()));
    }

    #[test]
    fn test_decode_demand_with_bad_bool_leaves_field_empty() {
        let words = vec![
            owner_word(),
            abi::word_from_u128(WAD),
            abi::word_from_u64(300),
            abi::word_from_u64(0),
            abi::word_from_u64(7),
        ];
        let raw = decode_order(Side::Lend, 1, &words).unwrap().unwrap();
        assert_eq!(raw.active, None);
        assert_eq!(raw.min_collateral_ratio, None);
    }

    #[test]
    fn test_decode_unused_order_id() {
        let words = vec![[0u8; 32]; 6];
        assert_eq!(decode_order(Side::Borrow, 1, &words).unwrap(), None);
    }

    #[test]
    fn test_decode_short_order_is_parse_error() {
        let words = vec![owner_word(); 2];
        assert!(matches!(
            decode_order(Side::Borrow, 1, &words),
            Err(LedgerError::ParseError(_))
        ));
    }

    #[test]
    fn test_decode_trove_data() {
        let mut words = vec![[0u8; 32]; 10];
        words[0] = abi::word_from_u128(2_000 * WAD);
        words[1] = abi::word_from_u128(WAD);
        words[5] = abi::word_from_u128(1_990 * WAD);
        words[6] = abi::word_from_u128(5 * WAD / 100);
        words[7] = abi::word_from_u128(1_990 * WAD * (5 * WAD / 100));
        words[9] = abi::word_from_u64(1_700_000_000);

        let position = decode_latest_trove_data(PositionId::from_u64(9), &words)
            .unwrap()
            .unwrap();
        assert_eq!(position.debt, Decimal::from_u64(2_000));
        assert_eq!(position.collateral, Decimal::from_u64(1));
        assert_eq!(position.annual_interest_rate.as_wad(), 5 * WAD / 100);
        assert_eq!(position.last_rate_adjustment, 1_700_000_000);
        assert_eq!(position.recorded_debt, Decimal::from_u64(1_990));
        assert_eq!(
            position.weighted_recorded_debt,
            Decimal::from_str("99.5").unwrap()
        );
    }

    #[test]
    fn test_decode_closed_trove() {
        let words = vec![[0u8; 32]; 10];
        assert_eq!(
            decode_latest_trove_data(PositionId::from_u64(1), &words).unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_unknown_branch() {
        let reader = RpcLedgerReader::new("http://example.invalid".to_string(), vec![], None);
        assert_eq!(
            reader.get_list_size(4).await,
            Err(LedgerError::BranchNotFound(4))
        );
    }

    #[tokio::test]
    async fn test_order_book_not_configured() {
        let reader = RpcLedgerReader::new("http://example.invalid".to_string(), vec![], None);
        assert!(matches!(
            reader.get_order_counter(Side::Borrow).await,
            Err(LedgerError::NotConfigured(_))
        ));
    }
}
