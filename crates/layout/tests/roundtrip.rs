//! Property tests for the account codec

use margin_layout::{
    decode, encode, AccountFlags, AccountKind, AccountLayout, DecodedEntity, Group, LayoutError,
    LiquidityMiningInfo, MarginAccount, OpenOrders, OraclePrice, PerpMarket, PerpMarketInfo,
    PerpOpenOrder, PriceComponent, PriceInfo, PriceStatus, Pubkey, RootBank, SerumOrderSlot, Side,
    SpotMarket, SpotMarketInfo, TokenInfo, I80F48, MAX_NODE_BANKS, MAX_PAIRS, MAX_TOKENS,
};
use proptest::prelude::*;

fn fixed() -> impl Strategy<Value = I80F48> {
    any::<i128>().prop_map(I80F48::from_bits)
}

fn pubkey() -> impl Strategy<Value = Pubkey> {
    any::<[u8; 32]>().prop_map(Pubkey::new_from_array)
}

fn margin_account() -> impl Strategy<Value = MarginAccount> {
    (
        pubkey(),
        prop::collection::vec(fixed(), MAX_TOKENS),
        prop::collection::vec(any::<bool>(), MAX_PAIRS),
        prop::collection::btree_map(0u8..64, (0u8..15, any::<bool>(), any::<i128>(), any::<u64>()), 0..12),
        prop::collection::vec(any::<i64>(), MAX_PAIRS),
        0u8..=1,
    )
        .prop_map(|(owner, deposits, basket, orders, bases, version)| {
            let mut account = MarginAccount {
                version,
                owner,
                ..MarginAccount::default()
            };
            account.deposits.copy_from_slice(&deposits);
            account.in_margin_basket.copy_from_slice(&basket);
            for (index, base) in bases.into_iter().enumerate() {
                account.perp_accounts[index].base_position = base;
            }
            account.perp_orders = orders
                .into_iter()
                .map(|(slot, (market_index, bid, order_id, client_order_id))| PerpOpenOrder {
                    slot,
                    market_index,
                    side: if bid { Side::Bid } else { Side::Ask },
                    order_id,
                    client_order_id,
                })
                .collect();
            account
        })
}

fn open_orders() -> impl Strategy<Value = OpenOrders> {
    (
        pubkey(),
        (0u64..1_000_000, 0u64..1_000_000),
        prop::collection::btree_map(0u8..128, (any::<u128>(), any::<u64>(), any::<bool>()), 0..20),
    )
        .prop_map(|(owner, (free, locked), orders)| OpenOrders {
            account_flags: AccountFlags(AccountFlags::INITIALIZED | AccountFlags::OPEN_ORDERS),
            owner,
            base_token_free: free,
            base_token_total: free + locked,
            quote_token_free: locked,
            quote_token_total: free + locked,
            orders: orders
                .into_iter()
                .map(|(slot, (order_id, client_id, is_bid))| SerumOrderSlot {
                    slot,
                    order_id,
                    client_id,
                    is_bid,
                })
                .collect(),
            ..OpenOrders::default()
        })
}

fn oracle_price() -> impl Strategy<Value = OraclePrice> {
    (any::<i64>(), -12i32..12, 0usize..=32, any::<u64>()).prop_map(|(price, exponent, count, slot)| {
        let info = PriceInfo {
            price,
            conf: 1,
            status: PriceStatus::Trading,
            corp_act: 0,
            pub_slot: slot,
        };
        OraclePrice {
            exponent,
            valid_slot: slot,
            aggregate: info,
            components: vec![
                PriceComponent {
                    publisher: Pubkey::new_from_array([7; 32]),
                    aggregate: info,
                    latest: info,
                };
                count
            ],
            ..OraclePrice::default()
        }
    })
}

fn token_info() -> impl Strategy<Value = TokenInfo> {
    (pubkey(), pubkey(), any::<u8>()).prop_map(|(mint, root_bank, decimals)| TokenInfo {
        mint,
        root_bank,
        decimals,
    })
}

fn spot_market_info() -> impl Strategy<Value = SpotMarketInfo> {
    (pubkey(), prop::array::uniform5(fixed())).prop_map(|(spot_market, [maint_asset, init_asset, maint_liab, init_liab, fee])| {
        SpotMarketInfo {
            spot_market,
            maint_asset_weight: maint_asset,
            init_asset_weight: init_asset,
            maint_liab_weight: maint_liab,
            init_liab_weight: init_liab,
            liquidation_fee: fee,
        }
    })
}

fn perp_market_info() -> impl Strategy<Value = PerpMarketInfo> {
    (pubkey(), prop::array::uniform7(fixed()), any::<i64>(), any::<i64>()).prop_map(
        |(perp_market, [maint_asset, init_asset, maint_liab, init_liab, fee, maker, taker], base_lot_size, quote_lot_size)| {
            PerpMarketInfo {
                perp_market,
                maint_asset_weight: maint_asset,
                init_asset_weight: init_asset,
                maint_liab_weight: maint_liab,
                init_liab_weight: init_liab,
                liquidation_fee: fee,
                maker_fee: maker,
                taker_fee: taker,
                base_lot_size,
                quote_lot_size,
            }
        },
    )
}

fn group() -> impl Strategy<Value = Group> {
    (
        0u64..=MAX_PAIRS as u64,
        prop::array::uniform16(token_info()),
        prop::array::uniform15(spot_market_info()),
        prop::array::uniform15(perp_market_info()),
        prop::array::uniform15(pubkey()),
        (any::<u64>(), pubkey(), pubkey()),
        (any::<u64>(), any::<u32>(), any::<u32>(), any::<u64>()),
    )
        .prop_map(
            |(num_oracles, tokens, spot_markets, perp_markets, oracles, (nonce, admin, cache), (valid_interval, max_accounts, num_accounts, ref_mngo_required))| {
                Group {
                    num_oracles,
                    tokens,
                    spot_markets,
                    perp_markets,
                    oracles,
                    signer_nonce: nonce,
                    admin,
                    cache,
                    valid_interval,
                    max_accounts,
                    num_accounts,
                    ref_mngo_required,
                    ..Group::default()
                }
            },
        )
}

fn root_bank() -> impl Strategy<Value = RootBank> {
    (
        0u64..=MAX_NODE_BANKS as u64,
        prop::array::uniform8(pubkey()),
        prop::array::uniform5(fixed()),
        any::<u64>(),
    )
        .prop_map(|(num_node_banks, node_banks, [util, rate, max_rate, deposit, borrow], last_updated)| RootBank {
            optimal_util: util,
            optimal_rate: rate,
            max_rate,
            num_node_banks,
            node_banks,
            deposit_index: deposit,
            borrow_index: borrow,
            last_updated,
            ..RootBank::default()
        })
}

fn perp_market() -> impl Strategy<Value = PerpMarket> {
    (
        prop::array::uniform4(pubkey()),
        (any::<i64>(), any::<i64>(), any::<i64>()),
        prop::array::uniform5(fixed()),
        (any::<u64>(), any::<u64>(), prop::array::uniform4(any::<u64>())),
    )
        .prop_map(
            |([group, bids, asks, event_queue], (quote_lot_size, base_lot_size, open_interest), [long, short, fees, rate, depth], (last_updated, seq_num, [start, length, left, per_period]))| {
                PerpMarket {
                    group,
                    bids,
                    asks,
                    event_queue,
                    quote_lot_size,
                    base_lot_size,
                    long_funding: long,
                    short_funding: short,
                    open_interest,
                    last_updated,
                    seq_num,
                    fees_accrued: fees,
                    liquidity_mining_info: LiquidityMiningInfo {
                        rate,
                        max_depth_bps: depth,
                        period_start: start,
                        target_period_length: length,
                        mngo_left: left,
                        mngo_per_period: per_period,
                    },
                    ..PerpMarket::default()
                }
            },
        )
}

fn spot_market() -> impl Strategy<Value = SpotMarket> {
    (
        any::<u64>(),
        prop::array::uniform10(pubkey()),
        prop::array::uniform12(any::<u64>()),
    )
        .prop_map(|(flags, keys, numbers)| {
            let [own_address, base_mint, quote_mint, base_vault, quote_vault, request_queue, event_queue, bids, asks, _] = keys;
            let [nonce, base_deposits, base_fees, quote_deposits, quote_fees, dust, base_lot, quote_lot, fee_rate, rebates, _, _] =
                numbers;
            SpotMarket {
                account_flags: AccountFlags(flags | AccountFlags::INITIALIZED | AccountFlags::MARKET),
                own_address,
                vault_signer_nonce: nonce,
                base_mint,
                quote_mint,
                base_vault,
                base_deposits_total: base_deposits,
                base_fees_accrued: base_fees,
                quote_vault,
                quote_deposits_total: quote_deposits,
                quote_fees_accrued: quote_fees,
                quote_dust_threshold: dust,
                request_queue,
                event_queue,
                bids,
                asks,
                base_lot_size: base_lot,
                quote_lot_size: quote_lot,
                fee_rate_bps: fee_rate,
                referrer_rebates_accrued: rebates,
            }
        })
}

/// Encode through the tag-dispatched codec and decode it back
fn through_codec(entity: DecodedEntity) -> Result<(), TestCaseError> {
    let kind = entity.kind();
    let bytes = encode(&entity);
    prop_assert_eq!(bytes.len(), kind.payload_len());
    prop_assert_eq!(decode(kind.tag(), &bytes).unwrap(), entity);
    Ok(())
}

proptest! {
    #[test]
    fn margin_account_survives_encoding(account in margin_account()) {
        let entity = DecodedEntity::from(account);
        let bytes = encode(&entity);
        prop_assert_eq!(bytes.len(), MarginAccount::LEN);
        prop_assert_eq!(decode(AccountKind::MarginAccount.tag(), &bytes).unwrap(), entity);
    }

    #[test]
    fn open_orders_survive_encoding(oo in open_orders()) {
        let bytes = oo.pack();
        prop_assert_eq!(OpenOrders::unpack(&bytes).unwrap(), oo);
    }

    #[test]
    fn oracle_survives_encoding(price in oracle_price()) {
        let bytes = price.pack();
        prop_assert_eq!(OraclePrice::unpack(&bytes).unwrap(), price);
    }

    #[test]
    fn group_survives_encoding(value in group()) {
        through_codec(value.into())?;
    }

    #[test]
    fn root_bank_survives_encoding(bank in root_bank()) {
        through_codec(bank.into())?;
    }

    #[test]
    fn perp_market_survives_encoding(market in perp_market()) {
        through_codec(market.into())?;
    }

    #[test]
    fn spot_market_survives_encoding(market in spot_market()) {
        through_codec(market.into())?;
    }

    #[test]
    fn wrong_length_is_always_malformed(account in margin_account(), cut in 1usize..64) {
        let bytes = account.pack();
        let short = &bytes[..bytes.len() - cut];
        let is_malformed = matches!(
            decode(AccountKind::MarginAccount.tag(), short),
            Err(LayoutError::MalformedLayout { .. })
        );
        prop_assert!(is_malformed);

        let mut long = bytes.clone();
        long.extend(std::iter::repeat(0).take(cut));
        prop_assert!(decode(AccountKind::MarginAccount.tag(), &long).is_err());
    }

    #[test]
    fn arbitrary_bytes_never_panic(tag in any::<u8>(), data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let _ = decode(tag, &data);
    }
}
