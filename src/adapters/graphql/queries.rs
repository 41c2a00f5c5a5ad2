//! GraphQL Query Catalogue
//!
//! Provider query documents kept as data, keyed by the response shape the
//! normalizer expects back. Configuration may override a document; the
//! catalogue supplies the default.

use crate::domain::source::ResponseShape;

/// `marketByUniqueKey` lending-market query. Variables: `uniqueKey`, `chainId`.
pub const MARKET_BY_KEY: &str = r"
query MarketByKey($uniqueKey: String!, $chainId: Int!) {
  marketByUniqueKey(uniqueKey: $uniqueKey, chainId: $chainId) {
    uniqueKey
    lltv
    loanAsset { address symbol decimals }
    collateralAsset { address symbol decimals }
    state {
      collateralAssets
      collateralAssetsUsd
      borrowAssets
      borrowAssetsUsd
      supplyAssets
      supplyAssetsUsd
      liquidityAssets
      liquidityAssetsUsd
      supplyApy
      borrowApy
      fee
      utilization
      rewards { asset { address symbol } supplyApr borrowApr }
    }
    warnings { type level }
  }
}
";

/// `vaultByAddress` allocation query. Variables: `vaultAddress`, `chainId`.
pub const VAULT_ALLOCATION: &str = r"
query VaultAllocation($vaultAddress: String!, $chainId: Int!) {
  vaultByAddress(address: $vaultAddress, chainId: $chainId) {
    address
    symbol
    name
    asset { address symbol decimals }
    state {
      apy
      netApy
      totalAssets
      totalAssetsUsd
      fee
      timelock
      rewards { asset { address symbol } supplyApr }
      allocation {
        supplyCap
        supplyAssets
        supplyAssetsUsd
        enabled
        market {
          uniqueKey
          lltv
          loanAsset { address symbol decimals }
          collateralAsset { address symbol decimals }
          state {
            supplyApy
            borrowApy
            utilization
            supplyAssets
            supplyAssetsUsd
            borrowAssets
            borrowAssetsUsd
            liquidityAssets
            liquidityAssetsUsd
            rewards { asset { address symbol } supplyApr borrowApr }
          }
        }
      }
    }
  }
}
";

/// `portfolioV2` app-balance query. Variables: `addresses`, `chainIds`.
pub const PORTFOLIO: &str = r"
query Portfolio($addresses: [Address!]!, $chainIds: [Int!]) {
  portfolioV2(addresses: $addresses, chainIds: $chainIds) {
    appBalances {
      totalBalanceUSD
      byApp(first: 50) {
        edges {
          node {
            app { displayName slug }
            network { name chainId }
            balanceUSD
            positionBalances(first: 20) {
              edges {
                node {
                  ... on AppTokenPositionBalance {
                    type
                    address
                    symbol
                    balance
                    balanceUSD
                    displayProps { label }
                  }
                  ... on ContractPositionBalance {
                    type
                    address
                    balanceUSD
                    tokens {
                      metaType
                      token {
                        ... on BaseTokenPositionBalance { type address symbol balance balanceUSD }
                        ... on AppTokenPositionBalance { type address symbol balance balanceUSD }
                      }
                    }
                    displayProps { label }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}
";

/// Default document for a GraphQL shape, `None` for non-GraphQL shapes.
pub const fn document_for(shape: ResponseShape) -> Option<&'static str> {
    match shape {
        ResponseShape::MarketByKey => Some(MARKET_BY_KEY),
        ResponseShape::VaultAllocation => Some(VAULT_ALLOCATION),
        ResponseShape::Portfolio => Some(PORTFOLIO),
        ResponseShape::EulerVault => None,
    }
}

/// Every `first: N` literal in `document`, in order of appearance.
pub fn page_limits(document: &str) -> Vec<usize> {
    document
        .match_indices("first:")
        .filter_map(|(at, token)| {
            let rest = document[at + token.len()..].trim_start();
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_page_limits() {
        assert_eq!(page_limits(PORTFOLIO), vec![50, 20]);
        assert!(page_limits(MARKET_BY_KEY).is_empty());
        assert_eq!(page_limits("items(first:  5, skip: 0)"), vec![5]);
    }

    #[test]
    fn test_catalogue_covers_graphql_shapes() {
        assert!(document_for(ResponseShape::MarketByKey).is_some());
        assert!(document_for(ResponseShape::VaultAllocation).is_some());
        assert!(document_for(ResponseShape::Portfolio).is_some());
        assert!(document_for(ResponseShape::EulerVault).is_none());
    }
}
