use alloy::sol;

sol! {
    interface IHTokenFactory {
        function getHTokenCount() external view returns (uint256);
        function getHTokenAtIndex(uint256 index) external view returns (address);
        function getHTokenNameAtIndex(uint256 index) external view returns (string);
        function getHTokenSymbolAtIndex(uint256 index) external view returns (string);
        function createHTK(string name, string symbol) external returns (address);
    }

    interface IHToken {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function mint(uint256 amount) external;
        function burn(uint256 amount) external;

        event Transfer(address indexed from, address indexed to, uint256 value);
    }

    interface IHTokenRouter {
        function swapExactHTKForHTK(address fromToken, uint256 amount, address toToken) external returns (uint256);
    }
}

pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
