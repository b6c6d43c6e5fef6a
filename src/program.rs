//! Instruction builders for the voucher pool program.
//!
//! The agent never links the program crate; account lists here mirror the
//! program's account structs field-for-field. Order is significant.

use solana_program::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

use crate::instruction::PoolInstruction;
use crate::state::{self, PoolConfig};

/// Program id of the deployed voucher pool program.
pub const DEFAULT_PROGRAM_ID: Pubkey = solana_program::pubkey!("4rxv5KW47SDCVEQcgc2dDQxcWDyZ965SCTnA7sqF7gqT");

/// Addresses of one deployed pool, derived once from the program id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolProgram {
    pub program_id: Pubkey,
    pub pool_state: Pubkey,
    pub vault_authority: Pubkey,
}

impl PoolProgram {
    pub fn new(program_id: Pubkey) -> Self {
        let (pool_state, _) = state::derive_pool_state(&program_id);
        let (vault_authority, _) = state::derive_vault_authority(&program_id);
        Self { program_id, pool_state, vault_authority }
    }

    pub fn deployed() -> Self {
        Self::new(DEFAULT_PROGRAM_ID)
    }

    pub fn user_stake(&self, user: &Pubkey) -> Pubkey {
        state::derive_user_stake(&self.program_id, &self.pool_state, user).0
    }

    fn instruction(&self, ix: PoolInstruction, accounts: Vec<AccountMeta>) -> Instruction {
        Instruction { program_id: self.program_id, accounts, data: ix.pack() }
    }

    // ═══════════════════════════════════════════════════════════════
    // initializePool
    // ═══════════════════════════════════════════════════════════════

    pub fn initialize_pool(
        &self,
        pool_authority: &Pubkey,
        pool_delegate: &Pubkey,
        vault_ata: &Pubkey,
        voucher_mint: &Pubkey,
        config: PoolConfig,
    ) -> Instruction {
        self.instruction(
            PoolInstruction::InitializePool { config },
            vec![
                AccountMeta::new(*pool_authority, true),
                AccountMeta::new_readonly(*pool_delegate, false),
                AccountMeta::new(self.pool_state, false),
                AccountMeta::new(*vault_ata, false),
                AccountMeta::new_readonly(self.vault_authority, false),
                AccountMeta::new_readonly(*voucher_mint, false),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
        )
    }

    // ═══════════════════════════════════════════════════════════════
    // depositVoucher: delegate signs, user does not
    // ═══════════════════════════════════════════════════════════════

    pub fn deposit_voucher(
        &self,
        user: &Pubkey,
        pool_delegate: &Pubkey,
        user_voucher_ata: &Pubkey,
        pool_vault_ata: &Pubkey,
        amount: u64,
    ) -> Instruction {
        self.instruction(
            PoolInstruction::DepositVoucher { amount },
            vec![
                AccountMeta::new_readonly(*user, false),
                AccountMeta::new(*pool_delegate, true),
                AccountMeta::new(self.pool_state, false),
                AccountMeta::new(self.user_stake(user), false),
                AccountMeta::new(*user_voucher_ata, false),
                AccountMeta::new(*pool_vault_ata, false),
                AccountMeta::new_readonly(system_program::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
        )
    }

    // ═══════════════════════════════════════════════════════════════
    // recordYield
    // ═══════════════════════════════════════════════════════════════

    pub fn record_yield(&self, pool_delegate: &Pubkey, amount: u64) -> Instruction {
        self.instruction(
            PoolInstruction::RecordYield { amount },
            vec![
                AccountMeta::new_readonly(*pool_delegate, true),
                AccountMeta::new(self.pool_state, false),
            ],
        )
    }

    // ═══════════════════════════════════════════════════════════════
    // redeemVoucher: user signs
    // ═══════════════════════════════════════════════════════════════

    pub fn redeem_voucher(
        &self,
        user: &Pubkey,
        user_voucher_ata: &Pubkey,
        pool_vault_ata: &Pubkey,
        amount: u64,
    ) -> Instruction {
        self.instruction(
            PoolInstruction::RedeemVoucher { amount },
            vec![
                AccountMeta::new(*user, true),
                AccountMeta::new(self.pool_state, false),
                AccountMeta::new(self.user_stake(user), false),
                AccountMeta::new(*user_voucher_ata, false),
                AccountMeta::new(*pool_vault_ata, false),
                AccountMeta::new_readonly(self.vault_authority, false),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
        )
    }

    // ═══════════════════════════════════════════════════════════════
    // updatePoolConfig
    // ═══════════════════════════════════════════════════════════════

    pub fn update_pool_config(&self, pool_authority: &Pubkey, config: PoolConfig) -> Instruction {
        self.instruction(
            PoolInstruction::UpdatePoolConfig { config },
            vec![
                AccountMeta::new_readonly(*pool_authority, true),
                AccountMeta::new(self.pool_state, false),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployed_program_id_parses() {
        let p = PoolProgram::deployed();
        assert_eq!(p.program_id.to_string(), "4rxv5KW47SDCVEQcgc2dDQxcWDyZ965SCTnA7sqF7gqT");
        assert_eq!(p.pool_state, state::derive_pool_state(&p.program_id).0);
    }

    #[test]
    fn test_record_yield_accounts() {
        let p = PoolProgram::new(Pubkey::new_unique());
        let delegate = Pubkey::new_unique();
        let ix = p.record_yield(&delegate, 7);
        assert_eq!(ix.accounts.len(), 2);
        assert!(ix.accounts[0].is_signer);
        assert!(!ix.accounts[0].is_writable);
        assert_eq!(ix.accounts[1].pubkey, p.pool_state);
        assert!(ix.accounts[1].is_writable);
    }

    #[test]
    fn test_deposit_user_does_not_sign() {
        let p = PoolProgram::new(Pubkey::new_unique());
        let user = Pubkey::new_unique();
        let delegate = Pubkey::new_unique();
        let ix = p.deposit_voucher(&user, &delegate, &Pubkey::new_unique(), &Pubkey::new_unique(), 1);
        assert_eq!(ix.accounts.len(), 8);
        assert!(!ix.accounts[0].is_signer);
        assert!(ix.accounts[1].is_signer);
        assert_eq!(ix.accounts[3].pubkey, p.user_stake(&user));
        assert_eq!(ix.accounts[7].pubkey, spl_token::id());
    }

    #[test]
    fn test_redeem_accounts() {
        let p = PoolProgram::new(Pubkey::new_unique());
        let user = Pubkey::new_unique();
        let ix = p.redeem_voucher(&user, &Pubkey::new_unique(), &Pubkey::new_unique(), 1);
        assert_eq!(ix.accounts.len(), 7);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[5].pubkey, p.vault_authority);
    }
}
