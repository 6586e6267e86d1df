//! Conversions between native token units and UI units

use fixed::types::I80F48;

/// `10^exp` as fixed point, `None` once it leaves the 80-bit integer range
pub fn pow10(exp: u32) -> Option<I80F48> {
    let value = 10i128.checked_pow(exp)?;
    I80F48::checked_from_num(value)
}

/// Native amount to UI amount for a token with `decimals` places
pub fn native_to_ui(native: I80F48, decimals: u8) -> Option<I80F48> {
    native.checked_div(pow10(decimals as u32)?)
}

/// UI amount to native amount for a token with `decimals` places
pub fn ui_to_native(ui: I80F48, decimals: u8) -> Option<I80F48> {
    ui.checked_mul(pow10(decimals as u32)?)
}
